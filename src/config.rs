use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

/// Page sizes differ per endpoint across deployments, so each one is its own
/// knob with the production defaults baked in.
pub struct Config {
    pub port: u16,
    pub all_foods_page_size: u64,
    pub added_foods_page_size: u64,
    pub search_page_size: u64,
    pub orders_page_size: u64,
    pub top_selling_limit: u64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "3000"),
            all_foods_page_size: try_load("ALL_FOODS_PAGE_SIZE", "8"),
            added_foods_page_size: try_load("ADDED_FOODS_PAGE_SIZE", "2"),
            search_page_size: try_load("SEARCH_PAGE_SIZE", "2"),
            orders_page_size: try_load("ORDERS_PAGE_SIZE", "5"),
            top_selling_limit: try_load("TOP_SELLING_LIMIT", "4"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
