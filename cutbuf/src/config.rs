use crate::error::{ClipError, ClipResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipboardConfig {
    /// Maximum number of entries staged at once.
    pub max_entries: usize,

    /// Refuse further entries when full instead of evicting the oldest.
    pub strict_capacity: bool,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            max_entries: 512,
            strict_capacity: false,
        }
    }
}

impl ClipboardConfig {
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> ClipResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ClipError::ConfigError(format!("failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ClipError::ConfigError(format!("failed to parse config: {e}")))?;

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> ClipResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClipError::ConfigError(format!("failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| ClipError::ConfigError(format!("failed to write config file: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_toml() {
        let config = ClipboardConfig {
            max_entries: 16,
            strict_capacity: true,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipboard.toml");
        config.save_to_file(&path).unwrap();

        let reloaded = ClipboardConfig::load_from_file(&path).unwrap();
        assert_eq!(reloaded.max_entries, 16);
        assert!(reloaded.strict_capacity);
    }

    #[test]
    fn missing_file_reports_a_config_error() {
        let err = ClipboardConfig::load_from_file("/nonexistent/clipboard.toml").unwrap_err();
        assert!(matches!(err, ClipError::ConfigError(_)));
    }
}
