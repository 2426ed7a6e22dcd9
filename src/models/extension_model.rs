use serde::{Deserialize, Serialize};

use hspf_reader::ScanOptions;

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtensionConfig {
    pub name: String,
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_file_formats")]
    pub file_formats: Vec<String>,
    pub connection: Connection,
    #[serde(default)]
    pub decoder: DecoderConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Connection {
    pub ip: String,
    pub port: u16,
}

/// Decoder settings applied to every file the server reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub resync_limit: usize,
    /// Interval name used when a read request for an HBN file names none.
    pub default_interval: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            resync_limit: ScanOptions::default().resync_limit,
            default_interval: "daily".to_string(),
        }
    }
}

impl DecoderConfig {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            resync_limit: self.resync_limit,
        }
    }
}

fn default_file_formats() -> Vec<String> {
    vec!["hbn".to_string(), "wdm".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_decoder_defaults() {
        let json = r#"{
            "name": "HSPF Reader",
            "id": "hspf_reader",
            "version": "0.1.0",
            "connection": { "ip": "127.0.0.1", "port": 0 }
        }"#;
        let config: ExtensionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.file_formats, vec!["hbn", "wdm"]);
        assert_eq!(config.decoder.default_interval, "daily");
        assert_eq!(config.decoder.scan_options().resync_limit, 64);
    }

    #[test]
    fn test_decoder_section_overrides() {
        let json = r#"{
            "name": "HSPF Reader",
            "id": "hspf_reader",
            "version": "0.1.0",
            "connection": { "ip": "0.0.0.0", "port": 8123 },
            "decoder": { "resync_limit": 3 }
        }"#;
        let config: ExtensionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.connection.port, 8123);
        assert_eq!(config.decoder.resync_limit, 3);
        assert_eq!(config.decoder.default_interval, "daily");
    }
}
