use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Store settings
    pub db_dir: Option<String>,
    pub store_id: Option<String>,
    pub channel_name: Option<String>,
    pub default_year: Option<u16>,

    // Server settings
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub channel_capacity: Option<usize>,

    // Event log maintenance
    pub event_retention_days: Option<u64>,
    pub prune_interval_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
store_id = "fosdem2026"
default_year = 2026
port = 8080
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.store_id.as_deref(), Some("fosdem2026"));
        assert_eq!(config.default_year, Some(2026));
        assert_eq!(config.port, Some(8080));
        assert!(config.db_dir.is_none());
        assert!(config.event_retention_days.is_none());
    }

    #[test]
    fn rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();

        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = FileConfig::load(Path::new("/nonexistent/bookmarks.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
