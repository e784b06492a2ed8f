//! Process-level configuration, spec §6 "Environment". Everything here is
//! read once at startup; behavior-affecting values that may change at
//! runtime live in the `Setting` entity instead (`reencode_core::settings`).

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_path: PathBuf,
    pub transcoder_binary: String,
    pub probe_binary: String,
    pub scratch_dir: PathBuf,
    pub scan_interval: Option<std::time::Duration>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let scan_interval = match env::var("SCAN_INTERVAL") {
            Ok(raw) => Some(humantime::parse_duration(&raw)?),
            Err(_) => None,
        };

        Ok(Self {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "7979".to_string())
                .parse()
                .unwrap_or(7979),

            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./reencode.db".to_string())
                .into(),

            transcoder_binary: env::var("TRANSCODER_BINARY").unwrap_or_else(|_| "ffmpeg".to_string()),
            probe_binary: env::var("PROBE_BINARY").unwrap_or_else(|_| "ffprobe".to_string()),

            scratch_dir: env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("reencode-scratch")),

            scan_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_absent() {
        for key in ["SERVER_PORT", "DATABASE_PATH", "TRANSCODER_BINARY", "PROBE_BINARY", "SCRATCH_DIR", "SCAN_INTERVAL"] {
            env::remove_var(key);
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.server_port, 7979);
        assert_eq!(config.transcoder_binary, "ffmpeg");
        assert!(config.scan_interval.is_none());
    }
}
