//! Server configuration (SPEC_FULL ambient stack, grounded on `Config::load`
//! in the teacher's `main.rs`): a TOML file with `$VAR` expansion and
//! `hf://`/`hf-snapshot://` resolution applied to path-shaped fields.

use crate::utils::resolve_or_download;
use anyhow::Result;
use rt_core::InferenceSettings;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PreloadEntry {
    pub source: String,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    /// Wall-clock timeout (seconds) for `chat`/`chat_stream` calls before the
    /// native call is abandoned and the model is marked `Failed` (spec §5
    /// cancellation & timeouts). Consumed by `http::AppState::chat_timeout`.
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,
    #[serde(default)]
    pub default_settings: InferenceSettings,
    #[serde(default)]
    pub preload: Vec<PreloadEntry>,
    /// Native library search path root; full path is
    /// `<bin_root>/<engine>/<os>/<cpu-microarch>/` (spec §6).
    #[serde(default = "default_bin_root")]
    pub bin_root: String,
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_instance_name() -> String {
    "default".to_string()
}
fn default_chat_timeout_secs() -> u64 {
    120
}
fn default_bin_root() -> String {
    "bin".to_string()
}

impl Config {
    pub fn load<P: AsRef<std::path::Path>>(p: P) -> Result<Self> {
        let raw = std::fs::read_to_string(p)?;
        let mut config: Self = toml::from_str(&raw)?;

        config.log_dir = resolve_or_download(&config.log_dir)?;
        config.instance_name = resolve_or_download(&config.instance_name)?;
        config.bin_root = resolve_or_download(&config.bin_root)?;
        for entry in config.preload.iter_mut() {
            entry.source = crate::utils::replace_env_vars(&entry.source);
        }
        Ok(config)
    }

    /// `$HUGGINGFACE_TOKEN`, sent as `Authorization: Bearer <token>` for
    /// remote fetches (spec §6 environment/configuration).
    pub fn hf_token() -> Option<String> {
        std::env::var("HUGGINGFACE_TOKEN").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_fields() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.addr, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(config.preload.is_empty());
    }
}
