//! Environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use uplink_core::{MimePattern, UploadLimits};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub limits: UploadLimits,
    /// Bound on simultaneous compression tasks; defaults to the host's
    /// available parallelism when unset.
    pub postprocess_concurrency: Option<usize>,
    pub ffmpeg_path: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = UploadLimits::default();
        let limits = UploadLimits {
            max_file_size_bytes: env_parse("MAX_FILE_SIZE_BYTES", defaults.max_file_size_bytes)?,
            max_file_count: env_parse("MAX_FILE_COUNT", defaults.max_file_count)?,
            max_field_size_bytes: env_parse("MAX_FIELD_SIZE_BYTES", defaults.max_field_size_bytes)?,
            max_field_count: env_parse("MAX_FIELD_COUNT", defaults.max_field_count)?,
            allowed_mime_patterns: mime_patterns_from_env(defaults.allowed_mime_patterns),
            buffer_size_bytes: env_parse("BUFFER_SIZE_BYTES", defaults.buffer_size_bytes)?,
            compression_threshold_bytes: env_parse(
                "COMPRESSION_THRESHOLD_BYTES",
                defaults.compression_threshold_bytes,
            )?,
            session_timeout: Duration::from_secs(env_parse(
                "SESSION_TIMEOUT_SECS",
                defaults.session_timeout.as_secs(),
            )?),
        };

        let bind_addr: SocketAddr = env_parse(
            "UPLINK_BIND_ADDR",
            "0.0.0.0:3000"
                .parse()
                .context("default bind address is invalid")?,
        )?;

        Ok(Config {
            bind_addr,
            upload_dir: PathBuf::from(
                std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            ),
            limits,
            postprocess_concurrency: match std::env::var("POSTPROCESS_CONCURRENCY") {
                Ok(v) => Some(
                    v.parse()
                        .map_err(|e| anyhow::anyhow!("invalid POSTPROCESS_CONCURRENCY: {e}"))?,
                ),
                Err(_) => None,
            },
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
        })
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn mime_patterns_from_env(default: Vec<MimePattern>) -> Vec<MimePattern> {
    match std::env::var("ALLOWED_MIME_TYPES") {
        Ok(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(MimePattern::new)
            .collect(),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = Config::from_env().unwrap();
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert_eq!(config.limits.max_file_count, 3);
        assert!(config.limits.allows_mime("video/mp4"));
    }
}
