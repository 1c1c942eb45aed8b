//! Engine configuration, sourced from the environment with logged fallbacks.

use std::{env, path::PathBuf};

use gss_common::parse_boolean_flag;
use log::*;

pub const DEFAULT_CACHE_PATH: &str = "./data/orders.json";
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Where the file-backed cache lives. Ignored when `in_memory` is set.
    pub cache_path: PathBuf,
    /// Buffer size for each event relay channel.
    pub event_buffer_size: usize,
    /// Run with a purely in-memory cache. Useful for tests and ephemeral sessions.
    pub in_memory: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            in_memory: false,
        }
    }
}

impl SyncConfig {
    /// Build a configuration from the environment:
    ///
    /// - `OSE_CACHE_PATH`: path to the cache file. Default: `./data/orders.json`.
    /// - `OSE_EVENT_BUFFER_SIZE`: relay channel capacity. Default: 25.
    /// - `OSE_IN_MEMORY`: any of 1/true/y/yes to skip the file cache entirely. Default: false.
    pub fn from_env_or_default() -> Self {
        let cache_path = env::var("OSE_CACHE_PATH").map(PathBuf::from).unwrap_or_else(|_| {
            info!("🪛️ OSE_CACHE_PATH is not set. Using the default, {DEFAULT_CACHE_PATH}");
            PathBuf::from(DEFAULT_CACHE_PATH)
        });
        let event_buffer_size = env::var("OSE_EVENT_BUFFER_SIZE")
            .map(|s| {
                s.parse::<usize>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid value for OSE_EVENT_BUFFER_SIZE: {e}. Using the default instead.");
                    DEFAULT_EVENT_BUFFER_SIZE
                })
            })
            .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        let in_memory = parse_boolean_flag(env::var("OSE_IN_MEMORY").ok(), false);
        Self { cache_path, event_buffer_size, in_memory }
    }

    pub fn with_in_memory_cache(mut self) -> Self {
        self.in_memory = true;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.cache_path, PathBuf::from("./data/orders.json"));
        assert_eq!(config.event_buffer_size, 25);
        assert!(!config.in_memory);
    }

    #[test]
    fn env_overrides() {
        // Set-and-unset in one test to avoid cross-test env races.
        env::set_var("OSE_CACHE_PATH", "/tmp/orders-test.json");
        env::set_var("OSE_EVENT_BUFFER_SIZE", "not-a-number");
        env::set_var("OSE_IN_MEMORY", "yes");
        let config = SyncConfig::from_env_or_default();
        env::remove_var("OSE_CACHE_PATH");
        env::remove_var("OSE_EVENT_BUFFER_SIZE");
        env::remove_var("OSE_IN_MEMORY");
        assert_eq!(config.cache_path, PathBuf::from("/tmp/orders-test.json"));
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.in_memory);
    }
}
