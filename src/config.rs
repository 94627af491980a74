use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::api::{DRINK_API, MEAL_API};

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub meal_api: String,
    pub drink_api: String,
    pub card_delay: Duration,
    pub home_query: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "gastrochef.sqlite3".to_string(),
            meal_api: MEAL_API.to_string(),
            drink_api: DRINK_API.to_string(),
            card_delay: Duration::from_millis(50),
            home_query: "Chicken".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let delay_ms = try_load(
            &lookup,
            "GASTROCHEF_CARD_DELAY_MS",
            defaults.card_delay.as_millis() as u64,
        );
        Self {
            db_path: try_load(&lookup, "GASTROCHEF_DB_PATH", defaults.db_path),
            meal_api: try_load(&lookup, "GASTROCHEF_MEAL_API", defaults.meal_api),
            drink_api: try_load(&lookup, "GASTROCHEF_DRINK_API", defaults.drink_api),
            card_delay: Duration::from_millis(delay_ms),
            home_query: try_load(&lookup, "GASTROCHEF_HOME_QUERY", defaults.home_query),
        }
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        Some(value) => value.trim().parse().unwrap_or_else(|e| {
            log::warn!("Invalid {} value {:?}: {}, using default: {}", key, value, e, default);
            default
        }),
        None => {
            log::debug!("{} not set, using default: {}", key, default);
            default
        }
    }
}
