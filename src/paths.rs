use std::path::PathBuf;

/// Default config file searched for when `--config` isn't given
/// explicitly: `~/.config/xd2031/xd2031.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("xd2031")
        .join("xd2031.toml")
}

/// Directory the server logs connection transcripts to:
/// `~/.local/share/xd2031/logs/`.
pub fn logs_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("xd2031")
        .join("logs")
}

/// Resolve a possibly-relative image path against a config's `root`.
pub fn resolve_image_path(root: &str, image: &str) -> PathBuf {
    let image_path = PathBuf::from(image);
    if image_path.is_absolute() {
        image_path
    } else {
        PathBuf::from(root).join(image_path)
    }
}
