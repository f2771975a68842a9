use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::{parse_log_level, ThreadConfig};
use crate::harness::StressPlan;

/// Stress harness for the emulator threading layer
#[derive(Parser, Debug)]
#[command(name = "yabthreads")]
#[command(version)]
#[command(about = "Push items through the worker registry and event queue and check none are lost", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of producer workers
    #[arg(short, long, default_value_t = 2)]
    pub producers: usize,

    /// Number of consumer workers
    #[arg(short = 'C', long, default_value_t = 2)]
    pub consumers: usize,

    /// Total items to pass through the queue
    #[arg(short, long, default_value_t = 10_000)]
    pub items: u64,

    /// Event queue capacity (overrides the config file)
    #[arg(short = 'q', long, value_name = "SLOTS")]
    pub capacity: Option<usize>,

    /// Log level (nothing, error, warn, info, debug, all)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn merge_into_config(&self, mut config: ThreadConfig) -> Result<ThreadConfig> {
        if let Some(capacity) = self.capacity {
            config.queue_capacity = capacity;
        }
        if let Some(level) = &self.log_level {
            config.log_level = parse_log_level(level)?;
        }
        // make room for every requested worker
        config.worker_slots = config.worker_slots.max(self.producers + self.consumers);
        config.validate()?;
        Ok(config)
    }

    pub fn plan(&self) -> StressPlan {
        StressPlan {
            producers: self.producers,
            consumers: self.consumers,
            items: self.items,
        }
    }
}
