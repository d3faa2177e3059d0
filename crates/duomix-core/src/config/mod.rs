//! Device configuration
//!
//! One YAML file describes the whole device: audio pipeline, initial mixer and
//! tone values, crossover, dial handling and the serial port.
//!
//! # Usage
//!
//! ```ignore
//! use duomix_core::config::{default_config_path, load_device_config, save_config};
//!
//! let path = default_config_path();
//! let config = load_device_config(&path);
//! save_config(&config, &path)?;
//! ```

mod device;
mod io;
mod paths;

pub use device::{load_device_config, DeviceConfig, SerialConfig};
pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path, CONFIG_FILE_NAME};
