//! The configuration surface: the `workers`, `max-throughput`, and
//! `affinity.*` table, built from the `config` crate the same way the
//! teacher's `load_config` builds its own settings — defaults first, then
//! an optional `RIKER_CONF` system file, then an optional `APP_CONF`
//! application file.

use std::env;

use config::{Config, File};

use crate::scheduler::affinity::{parse_core_sets_lenient, AffinityAssigner};
use crate::scheduler::SchedulerConfig;

/// Typed view over the merged configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub workers: usize,
    pub max_throughput: usize,
    pub worker_cores: String,
    pub detached_cores: String,
    pub blocking_cores: String,
    pub other_cores: String,
}

impl RuntimeConfig {
    /// Loads from `load_config()`'s merged sources.
    pub fn load() -> RuntimeConfig {
        RuntimeConfig::from_config(&load_config())
    }

    pub fn from_config(cfg: &Config) -> RuntimeConfig {
        RuntimeConfig {
            workers: cfg
                .get_int("workers")
                .map(|n| n.max(1) as usize)
                .unwrap_or_else(|_| num_cpus::get()),
            max_throughput: cfg.get_int("max-throughput").map(|n| n.max(1) as usize).unwrap_or(50),
            worker_cores: cfg.get_string("affinity.worker-cores").unwrap_or_default(),
            detached_cores: cfg.get_string("affinity.detached-cores").unwrap_or_default(),
            blocking_cores: cfg.get_string("affinity.blocking-cores").unwrap_or_default(),
            other_cores: cfg.get_string("affinity.other-cores").unwrap_or_default(),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.workers,
            max_throughput: self.max_throughput,
            worker_affinity: AffinityAssigner::new(parse_core_sets_lenient(&self.worker_cores)),
        }
    }

    pub fn detached_affinity(&self) -> AffinityAssigner {
        AffinityAssigner::new(parse_core_sets_lenient(&self.detached_cores))
    }

    pub fn blocking_affinity(&self) -> AffinityAssigner {
        AffinityAssigner::new(parse_core_sets_lenient(&self.blocking_cores))
    }

    pub fn other_affinity(&self) -> AffinityAssigner {
        AffinityAssigner::new(parse_core_sets_lenient(&self.other_cores))
    }
}

impl Default for RuntimeConfig {
    fn default() -> RuntimeConfig {
        RuntimeConfig {
            workers: num_cpus::get(),
            max_throughput: 50,
            worker_cores: String::new(),
            detached_cores: String::new(),
            blocking_cores: String::new(),
            other_cores: String::new(),
        }
    }
}

/// Loads the merged configuration. `RIKER_CONF` (default
/// `config/riker.toml`) carries settings for the runtime itself;
/// `APP_CONF` (default `config/app`) carries settings specific to the
/// embedding application. Both are optional; their absence just leaves the
/// defaults in place.
pub fn load_config() -> Config {
    let mut builder = Config::builder()
        .set_default("workers", num_cpus::get() as i64)
        .unwrap()
        .set_default("max-throughput", 50i64)
        .unwrap()
        .set_default("affinity.worker-cores", "")
        .unwrap()
        .set_default("affinity.detached-cores", "")
        .unwrap()
        .set_default("affinity.blocking-cores", "")
        .unwrap()
        .set_default("affinity.other-cores", "")
        .unwrap();

    let path = env::var("RIKER_CONF").unwrap_or_else(|_| "config/riker.toml".into());
    builder = builder.add_source(File::with_name(&path).required(false));

    let path = env::var("APP_CONF").unwrap_or_else(|_| "config/app".into());
    builder = builder.add_source(File::with_name(&path).required(false));

    builder.build().expect("static defaults plus optional files always build")
}
