use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::logging::LogLevel;
use crate::threading::DEFAULT_WORKER_SLOTS;

/// Default number of slots for event queues created without an explicit size
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Settings for the threading layer
///
/// Read from a `key = value` file; lines starting with `#` are comments.
///
/// ```text
/// worker_slots = 8
/// queue_capacity = 64
/// stack_size = 512k
/// name_prefix = yab-
/// log_level = debug
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadConfig {
    /// Size of the worker registry (ids `0..worker_slots`)
    pub worker_slots: usize,
    pub queue_capacity: usize,
    /// Stack size for worker threads, `None` for the platform default
    pub stack_size: Option<usize>,
    /// Worker threads are named `<name_prefix><id>`
    pub name_prefix: String,
    pub log_level: LogLevel,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            worker_slots: DEFAULT_WORKER_SLOTS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stack_size: None,
            name_prefix: String::from("worker-"),
            log_level: LogLevel::Warning,
        }
    }
}

impl ThreadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_slots == 0 {
            anyhow::bail!("worker_slots must be at least 1");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }
        Ok(())
    }
}

/// Load the configuration file at `path`
///
/// No path, or a path that does not exist, yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ThreadConfig> {
    let Some(path) = path else {
        return Ok(ThreadConfig::default());
    };
    if !path.exists() {
        debug!("config file {} not found, using defaults", path.display());
        return Ok(ThreadConfig::default());
    }

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_config(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

/// Parse configuration text, starting from the defaults
pub fn parse_config(text: &str) -> Result<ThreadConfig> {
    let mut config = ThreadConfig::default();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let lineno = index + 1;
        let (key, value) = line
            .split_once('=')
            .with_context(|| format!("line {}: expected `key = value`", lineno))?;
        let (key, value) = (key.trim(), value.trim());

        match key {
            "worker_slots" => {
                config.worker_slots =
                    parse_count(value).with_context(|| format!("line {}: worker_slots", lineno))?
            }
            "queue_capacity" => {
                config.queue_capacity = parse_count(value)
                    .with_context(|| format!("line {}: queue_capacity", lineno))?
            }
            "stack_size" => {
                config.stack_size = Some(
                    parse_stack_size(value)
                        .with_context(|| format!("line {}: stack_size", lineno))?,
                )
            }
            "name_prefix" => config.name_prefix = value.to_string(),
            "log_level" => {
                config.log_level = parse_log_level(value)
                    .with_context(|| format!("line {}: log_level", lineno))?
            }
            _ => warn!("Ignoring unknown config key '{}' on line {}", key, lineno),
        }
    }

    config.validate()?;
    Ok(config)
}

/// Parse a strictly positive count
pub fn parse_count(s: &str) -> Result<usize> {
    let n: usize = s.parse().context("Invalid count value")?;
    if n == 0 {
        anyhow::bail!("Count must be positive");
    }
    Ok(n)
}

/// Parse a byte size with an optional `k`/`m` suffix (e.g. "512k", "2M")
pub fn parse_stack_size(s: &str) -> Result<usize> {
    let lower = s.to_ascii_lowercase();
    let (digits, multiplier) = match lower.strip_suffix('k') {
        Some(d) => (d, 1024),
        None => match lower.strip_suffix('m') {
            Some(d) => (d, 1024 * 1024),
            None => (lower.as_str(), 1),
        },
    };
    let n: usize = digits.trim().parse().context("Invalid stack size")?;
    let bytes = n
        .checked_mul(multiplier)
        .context("Stack size overflows")?;
    if bytes == 0 {
        anyhow::bail!("Stack size must be positive");
    }
    Ok(bytes)
}

pub fn parse_log_level(s: &str) -> Result<LogLevel> {
    LogLevel::from_name(s).with_context(|| format!("Unknown log level '{}'", s))
}
