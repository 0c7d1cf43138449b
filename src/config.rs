use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_port: u16,
    /// Where dropped files are staged until their entry is deleted.
    pub data_dir: PathBuf,
    /// Endpoint handing out signed PUT URLs (`?file-name=..&file-type=..`).
    pub sign_url: String,
    /// Only paths under this directory can be selected by path.
    pub select_root: PathBuf,
    /// Picker filter in HTML `accept` syntax.
    pub accept: String,
    pub max_drop_bytes: usize,
    pub log_level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Default settings
            .set_default("server_port", 3000)?
            .set_default("data_dir", "./data")?
            .set_default("sign_url", "http://localhost:8080/sign-s3")?
            .set_default("select_root", ".")?
            .set_default("accept", "image/*")?
            .set_default("max_drop_bytes", 512 * 1024 * 1024)?
            .set_default("log_level", "info")?
            // Config file (optional)
            .add_source(File::with_name("config").required(false))
            // Environment variables (e.g. MULTIUPLOADER_SIGN_URL=http://...)
            .add_source(Environment::with_prefix("MULTIUPLOADER"));

        builder.build()?.try_deserialize()
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("staging")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.accept, "image/*");
        assert_eq!(settings.max_drop_bytes, 512 * 1024 * 1024);
        assert!(settings.staging_dir().ends_with("staging"));
        assert_eq!(settings.select_root, PathBuf::from("."));
    }
}
