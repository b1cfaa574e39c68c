//! Argument building and output parsing for the `ec2-register` tool.

use crate::types::RegisterImageParams;

pub const REGISTER_PROGRAM: &str = "ec2-register";

/// Arguments for `ec2-register`, in the order the tool documents them.
/// Returned as a vector so no value is ever re-parsed by a shell.
pub fn register_command_args(params: &RegisterImageParams) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--region".into(),
        params.region.clone(),
        "--virtualization-type".into(),
        params.virtualization_type.clone(),
        "--snapshot".into(),
        params.snapshot_id.clone(),
    ];
    if let Some(description) = &params.description {
        args.push("--description".into());
        args.push(description.clone());
    }
    for m in &params.ephemeral_mappings {
        args.push("--block-device-mapping".into());
        args.push(format!("{}={}", m.device, m.virtual_name));
    }
    if let Some(kernel) = &params.kernel_id {
        args.push("--kernel".into());
        args.push(kernel.clone());
    }
    args.push("--root-device-name".into());
    args.push(params.root_device_name.clone());
    args.push("--architecture".into());
    args.push(params.architecture.clone());
    if let Some(name) = &params.name {
        args.push("--name".into());
        args.push(name.clone());
    }
    args
}

/// Pulls the new image id out of `ec2-register` output (`IMAGE\tami-1234`).
pub fn parse_register_output(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        let mut fields = line.split_whitespace();
        if fields.next() == Some("IMAGE") {
            if let Some(id) = fields.next() {
                return Some(id.to_string());
            }
        }
    }
    stdout
        .split_whitespace()
        .find(|tok| tok.starts_with("ami-"))
        .map(str::to_string)
}
