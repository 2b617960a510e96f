//! HAL configuration

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for overrides (`CAMERA_HAL_MAX_OPEN_SESSIONS=1`)
pub const ENV_PREFIX: &str = "CAMERA_HAL";

/// Front camera id on two-camera devices
pub const FRONT_CAMERA_ID: i32 = 1;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Process-wide HAL configuration, read once at module load
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HalConfig {
    /// Concurrently open sessions allowed by the session table
    pub max_open_sessions: usize,

    /// Buffer count negotiated with the preview window
    pub preview_buffer_count: u32,

    /// Depth of the driver → relay channel
    pub relay_queue_depth: usize,

    /// Report every camera as back-facing
    pub force_rear_facing: bool,

    /// Mounting orientation reported for back cameras (degrees)
    pub back_orientation: u32,

    /// Mounting orientation reported for front cameras (degrees)
    pub front_orientation: u32,

    /// Report the platform's own orientation instead of the two values above
    pub use_platform_orientation: bool,

    /// Forced `orientation` parameter
    pub params_orientation: String,

    /// Forced `rotation` parameter
    pub params_rotation: Option<String>,

    /// `front-camera-mode` for the front camera (`mirror` or `reverse`)
    pub front_camera_mode: Option<String>,

    /// File the camera id is written to before a driver is opened
    pub switch_camera_path: Option<PathBuf>,

    /// tracing level name
    pub log_level: String,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            max_open_sessions: 2,
            preview_buffer_count: 4,
            relay_queue_depth: 64,
            force_rear_facing: false,
            back_orientation: 90,
            front_orientation: 270,
            use_platform_orientation: false,
            params_orientation: "landscape".to_string(),
            params_rotation: None,
            front_camera_mode: None,
            switch_camera_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl HalConfig {
    /// Load from an optional key=value file layered with `CAMERA_HAL_*`
    /// environment overrides. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Ini).required(false));
        }
        let config: HalConfig = builder
            .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_open_sessions == 0 {
            return Err(ConfigError::Invalid {
                key: "max_open_sessions",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.preview_buffer_count == 0 {
            return Err(ConfigError::Invalid {
                key: "preview_buffer_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(mode) = &self.front_camera_mode {
            if mode != "mirror" && mode != "reverse" {
                return Err(ConfigError::Invalid {
                    key: "front_camera_mode",
                    reason: format!("expected mirror or reverse, got {mode:?}"),
                });
            }
        }
        for (key, value) in [
            ("params_orientation", Some(&self.params_orientation)),
            ("params_rotation", self.params_rotation.as_ref()),
        ] {
            if value.is_some_and(|v| v.contains(['=', ';'])) {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "parameter values may not contain '=' or ';'".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Per-session values, fixed for the lifetime of the session
    pub fn session(&self, camera_id: i32) -> SessionConfig {
        SessionConfig {
            camera_id,
            orientation: self.params_orientation.clone(),
            rotation: self.params_rotation.clone(),
            front_camera_mode: self.front_camera_mode.as_ref().map(|mode| {
                if camera_id == FRONT_CAMERA_ID {
                    mode.clone()
                } else {
                    "mirror".to_string()
                }
            }),
            preview_buffer_count: self.preview_buffer_count,
            relay_queue_depth: self.relay_queue_depth,
        }
    }
}

/// Configuration captured when a session is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub camera_id: i32,
    pub orientation: String,
    pub rotation: Option<String>,
    pub front_camera_mode: Option<String>,
    pub preview_buffer_count: u32,
    pub relay_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        HalConfig::default().session(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.ini", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = HalConfig::load_with_prefix(None, "CAMERA_HAL_TEST_NONE").unwrap();
        assert_eq!(config, HalConfig::default());
        assert_eq!(config.max_open_sessions, 2);
        assert_eq!(config.params_orientation, "landscape");
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let path = Path::new("/nonexistent/camera-hal.ini");
        let config = HalConfig::load_with_prefix(Some(path), "CAMERA_HAL_TEST_MISSING").unwrap();
        assert_eq!(config.preview_buffer_count, 4);
    }

    #[test]
    fn test_key_value_file() {
        let path = temp_file(
            "camera-hal-config",
            "max_open_sessions=1\nforce_rear_facing=true\nparams_rotation=90\nfront_camera_mode=reverse\n",
        );
        let config = HalConfig::load_with_prefix(Some(&path), "CAMERA_HAL_TEST_FILE").unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.max_open_sessions, 1);
        assert!(config.force_rear_facing);
        assert_eq!(config.params_rotation.as_deref(), Some("90"));
        assert_eq!(config.front_camera_mode.as_deref(), Some("reverse"));
        assert_eq!(config.relay_queue_depth, 64);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("CAMERA_HAL_TEST_ENV_PREVIEW_BUFFER_COUNT", "6");
        let config = HalConfig::load_with_prefix(None, "CAMERA_HAL_TEST_ENV").unwrap();
        std::env::remove_var("CAMERA_HAL_TEST_ENV_PREVIEW_BUFFER_COUNT");
        assert_eq!(config.preview_buffer_count, 6);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = HalConfig {
            front_camera_mode: Some("sideways".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "front_camera_mode", .. })
        ));

        let config = HalConfig {
            max_open_sessions: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HalConfig {
            params_orientation: "a;b".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_front_camera_mode() {
        let config = HalConfig {
            front_camera_mode: Some("reverse".to_string()),
            ..Default::default()
        };
        assert_eq!(config.session(1).front_camera_mode.as_deref(), Some("reverse"));
        assert_eq!(config.session(0).front_camera_mode.as_deref(), Some("mirror"));
        assert_eq!(HalConfig::default().session(1).front_camera_mode, None);
    }
}
