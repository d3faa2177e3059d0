//! Standard configuration locations

use std::path::PathBuf;

pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// `<config_dir>/duomix`, or `./duomix` when the platform has no config dir
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("duomix")
}

/// `<config_dir>/duomix/config.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let path = default_config_path();
        assert!(path.ends_with("duomix/config.yaml"));
    }
}
