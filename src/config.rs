use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::transport::Destination;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Audio
    pub frame_size: usize,      // Bytes por frame de transporte
    pub frame_duration_ms: u64, // Duración real de un frame
    pub read_chunk_size: usize, // Bytes leídos de la fuente por lectura
    pub bytes_per_second: Option<u64>,

    // Red
    pub http_timeout_secs: u64,
    pub default_destination: Option<String>,

    // Cache
    pub stream_cache_size: usize,
    pub stream_cache_ttl_secs: u64,

    // Radio
    pub radio_max_attempts: usize,

    // Rutas
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validar antes de tocar el disco
        config.validate()?;

        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("cannot create data directory {}", config.data_dir.display())
        })?;

        Ok(config)
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            // Audio
            frame_size: parse_or(&var, "FRAME_SIZE", defaults.frame_size)?,
            frame_duration_ms: parse_or(&var, "FRAME_DURATION_MS", defaults.frame_duration_ms)?,
            read_chunk_size: parse_or(&var, "READ_CHUNK_SIZE", defaults.read_chunk_size)?,
            bytes_per_second: match var("BYTES_PER_SECOND") {
                Some(val) => Some(parse("BYTES_PER_SECOND", &val)?),
                None => defaults.bytes_per_second,
            },

            // Red
            http_timeout_secs: parse_or(&var, "HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
            default_destination: var("DEFAULT_DESTINATION").map(|s| s.trim().to_string()),

            // Cache
            stream_cache_size: parse_or(&var, "STREAM_CACHE_SIZE", defaults.stream_cache_size)?,
            stream_cache_ttl_secs: parse_or(
                &var,
                "STREAM_CACHE_TTL_SECS",
                defaults.stream_cache_ttl_secs,
            )?,

            // Radio
            radio_max_attempts: parse_or(&var, "RADIO_MAX_ATTEMPTS", defaults.radio_max_attempts)?,

            // Rutas
            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Frames must be non-empty whole 16-bit samples (even byte count)
    /// - Frame duration must be between 1ms and 1s
    /// - A read chunk must hold at least one frame
    /// - Radio needs at least one attempt per refill
    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 || self.frame_size % 2 != 0 {
            anyhow::bail!(
                "Frame size must be a positive even number of bytes, got: {}",
                self.frame_size
            );
        }

        if !(1..=1000).contains(&self.frame_duration_ms) {
            anyhow::bail!(
                "Frame duration must be between 1 and 1000 ms, got: {}",
                self.frame_duration_ms
            );
        }

        if self.read_chunk_size < self.frame_size {
            anyhow::bail!(
                "Read chunk size ({}) must be at least one frame ({})",
                self.read_chunk_size,
                self.frame_size
            );
        }

        if self.radio_max_attempts == 0 {
            anyhow::bail!("Radio max attempts must be greater than 0");
        }

        if self.stream_cache_size == 0 {
            anyhow::bail!("Stream cache size must be greater than 0");
        }

        Ok(())
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn stream_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.stream_cache_ttl_secs)
    }

    pub fn default_destination(&self) -> Option<Destination> {
        self.default_destination.as_deref().map(Destination::new)
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Audio: {} byte frames every {}ms, {} byte reads\n  \
            Network: {} timeout, destination {}\n  \
            Cache: {} streams for {}\n  \
            Radio: {} attempts per refill\n  \
            Data: {}",
            self.frame_size,
            self.frame_duration_ms,
            self.read_chunk_size,
            humantime::format_duration(self.http_timeout()),
            self.default_destination.as_deref().unwrap_or("none"),
            self.stream_cache_size,
            humantime::format_duration(self.stream_cache_ttl()),
            self.radio_max_attempts,
            self.data_dir.display()
        )
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {key}: '{value}'"))
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => parse(key, &value),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Audio
            frame_size: 3840, // 20ms @ 48kHz estéreo s16
            frame_duration_ms: 20,
            read_chunk_size: 16 * 1024,
            bytes_per_second: None,

            // Red
            http_timeout_secs: 30,
            default_destination: None,

            // Cache
            stream_cache_size: 500,
            stream_cache_ttl_secs: 24 * 60 * 60,

            // Radio
            radio_max_attempts: 10,

            // Rutas
            data_dir: "./data".into(),
        }
    }
}
