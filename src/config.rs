//! Engine configuration

use std::env;

use serde::{Deserialize, Serialize};

/// Environment variable holding the worker thread count
pub const THREADS_ENV: &str = "DLHARNESS_THREADS";

/// Settings applied to every program instance created by a registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads for rule evaluation. 1 evaluates on the calling thread,
    /// 0 lets rayon pick one thread per core.
    pub threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { threads: 1 }
    }
}

impl EngineConfig {
    /// Defaults overridden by `DLHARNESS_THREADS` when it parses
    pub fn from_env() -> Self {
        let mut config = EngineConfig::default();
        if let Ok(raw) = env::var(THREADS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(threads) => config.threads = threads,
                Err(_) => tracing::warn!("Ignoring {}={:?}: not a number", THREADS_ENV, raw),
            }
        }
        config
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.threads != 1
    }
}
