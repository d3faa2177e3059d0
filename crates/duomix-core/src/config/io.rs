//! Generic YAML configuration I/O
//!
//! Loading never fails: the device must come up even with a broken config
//! file, so problems are logged and defaults used instead. Saving reports
//! errors to the caller.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load configuration from a YAML file
///
/// A missing file yields `T::default()`. An unreadable or unparsable file is
/// logged as a warning and also yields the default.
///
/// # Type Parameters
/// * `T` - Any deserializable config section with a `Default`
///
/// # Arguments
/// * `path` - YAML file to read
///
/// # Example
///
/// ```ignore
/// let audio: AudioConfig = load_config(Path::new("/etc/duomix/audio.yaml"));
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No config at {:?}, using defaults", path);
        return T::default();
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_yaml::from_str::<T>(&text).map_err(|e| e.to_string()));

    match parsed {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Ignoring config {:?} ({}), using defaults", path, e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file, creating parent directories
///
/// # Arguments
/// * `config` - Value to serialize
/// * `path` - Destination file; replaced if it exists
///
/// # Errors
///
/// Fails if the value cannot be represented as YAML, or if the directory or
/// file cannot be written.
///
/// # Example
///
/// ```ignore
/// save_config(&DeviceConfig::default(), &default_config_path())?;
/// ```
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    let yaml = serde_yaml::to_string(config).context("Config is not representable as YAML")?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create {:?}", dir))?;
    }
    fs::write(path, yaml).with_context(|| format!("Cannot write {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        rate: u32,
        label: String,
    }

    #[test]
    fn test_missing_file_gives_default() {
        let loaded: Sample = load_config(Path::new("/nonexistent/duomix/config.yaml"));
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let config = Sample {
            rate: 44_000,
            label: "bench".into(),
        };

        save_config(&config, &path).unwrap();
        assert_eq!(load_config::<Sample>(&path), config);
    }

    #[test]
    fn test_garbage_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "rate: [not, a, number").unwrap();
        assert_eq!(load_config::<Sample>(&path), Sample::default());
    }
}
