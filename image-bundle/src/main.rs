use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use image_bundle::metadata::DEFAULT_METADATA_FILE;
use image_bundle::out::{self, OutMode};
use image_bundle::utils::region_from_zone;
use image_bundle::{
    cloud, BundleConfig, BundleError, BundleOrchestrator, BundleRequest, BundleResult, CacheFileMetadataSource,
    EnvMetadataSource, MetadataSource, RegisterVia, StaticMetadataSource,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Snapshot this instance's root volume and register it as a new image.
#[derive(Parser, Debug)]
#[command(name = "image-bundle", version)]
struct Cli {
    /// Instance to bundle; defaults to the instance id in the metadata
    #[arg(long, env = "EC2_INSTANCE_ID")]
    instance_id: Option<String>,

    /// Name for the snapshot and the image
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Root device name convention, matched as a substring of attachment devices
    #[arg(long, default_value = "/dev/sda")]
    root_device: String,

    /// Log each stage without calling the provider
    #[arg(long, env = "IMAGE_BUNDLE_DRY_RUN")]
    dry_run: bool,

    /// How to register the image; `cli` runs ec2-register
    #[arg(long, value_enum, default_value_t = RegisterVia::Api)]
    register_with: RegisterVia,

    #[arg(long, default_value = DEFAULT_METADATA_FILE, conflicts_with = "metadata_env")]
    metadata_file: PathBuf,

    /// Read metadata from EC2_* environment variables instead of the cache file
    #[arg(long)]
    metadata_env: bool,

    /// Give up waiting for the snapshot or image after this many seconds
    #[arg(long, default_value_t = 20 * 60)]
    timeout_secs: u64,

    #[arg(long, default_value_t = 10)]
    poll_interval_secs: u64,

    #[arg(long, value_enum, default_value_t = OutMode::Text)]
    output: OutMode,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = cli.output;
    match bundle(cli).await {
        Ok(result) => match out::emit_result(mode, &result) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("FATAL: {e:#}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            out::emit_failure(mode, &e);
            ExitCode::FAILURE
        }
    }
}

async fn bundle(cli: Cli) -> Result<BundleResult, BundleError> {
    let source: Box<dyn MetadataSource> = if cli.metadata_env {
        Box::new(EnvMetadataSource)
    } else {
        Box::new(CacheFileMetadataSource::new(&cli.metadata_file))
    };
    let md = source.load().await?;

    let instance_id = cli
        .instance_id
        .or_else(|| md.instance_id.clone())
        .ok_or(BundleError::UnknownInstance)?;
    let region = md
        .availability_zone
        .as_deref()
        .and_then(region_from_zone)
        .map(str::to_string);

    let client = cloud::build_client(region, cli.register_with)
        .await
        .map_err(|e| BundleError::provider("LoadConfig", e))?;
    let config = BundleConfig::default()
        .with_root_device(cli.root_device)
        .with_poll(
            Duration::from_secs(cli.timeout_secs),
            Duration::from_secs(cli.poll_interval_secs),
        )
        .with_dry_run(cli.dry_run);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling bundle");
            on_signal.cancel();
        }
    });

    // metadata is loaded once; the orchestrator reuses this copy
    let metadata = Arc::new(StaticMetadataSource(md));
    let mut orchestrator = BundleOrchestrator::new(client, metadata, config).with_cancel(cancel);
    let request = BundleRequest::new(cli.name, cli.description);
    orchestrator.run(&instance_id, &request).await
}
