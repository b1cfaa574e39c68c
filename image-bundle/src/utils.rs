/// Environment value, with unset and blank treated alike.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(non_blank)
}

pub fn non_blank(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}

/// Region of an availability zone: everything up to and including the last
/// digit (`us-east-1a` -> `us-east-1`).
pub fn region_from_zone(zone: &str) -> Option<&str> {
    let end = zone.rfind(|c: char| c.is_ascii_digit())?;
    let region = &zone[..=end];
    region.contains('-').then_some(region)
}
