use std::fmt;
use std::sync::{Arc, Mutex};

use crate::db::{KeyValueStore, StoreError};

pub const THEME_KEY: &str = "gastrochef_theme";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThemePreference {
    #[default]
    Light,
    Dark,
}

impl ThemePreference {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemePreference::Light => "light",
            ThemePreference::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(ThemePreference::Light),
            "dark" => Some(ThemePreference::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemePreference::Light => ThemePreference::Dark,
            ThemePreference::Dark => ThemePreference::Light,
        }
    }
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ThemeStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    // Serializes read-modify-write cycles on the key.
    write: Mutex<()>,
}

impl ThemeStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
            write: Mutex::new(()),
        }
    }

    /// Falls back to light when unset or unrecognized.
    pub fn get(&self) -> ThemePreference {
        match self.kv.get(&self.key) {
            Ok(Some(value)) => ThemePreference::parse(&value).unwrap_or_else(|| {
                log::warn!("Unknown theme {:?} in {}, using light", value, self.key);
                ThemePreference::default()
            }),
            Ok(None) => ThemePreference::default(),
            Err(e) => {
                log::warn!("Could not read {}: {}", self.key, e);
                ThemePreference::default()
            }
        }
    }

    pub fn set(&self, theme: ThemePreference) -> Result<(), StoreError> {
        self.kv.set(&self.key, theme.as_str())
    }

    pub fn toggle(&self) -> Result<ThemePreference, StoreError> {
        let _guard = self.write.lock().unwrap_or_else(|e| e.into_inner());
        let theme = self.get().toggled();
        self.set(theme)?;
        Ok(theme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[test]
    fn defaults_to_light() {
        let store = ThemeStore::new(Arc::new(MemoryStore::default()), THEME_KEY);
        assert_eq!(store.get(), ThemePreference::Light);
    }

    #[test]
    fn toggle_persists_dark() {
        let kv = Arc::new(MemoryStore::default());
        let store = ThemeStore::new(kv.clone(), THEME_KEY);
        assert_eq!(store.toggle().unwrap(), ThemePreference::Dark);
        assert_eq!(store.get(), ThemePreference::Dark);
        assert_eq!(kv.get(THEME_KEY).unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn unrecognized_value_reads_as_default() {
        let kv = Arc::new(MemoryStore::default());
        kv.set(THEME_KEY, "\"dark\"").unwrap();
        let store = ThemeStore::new(kv, THEME_KEY);
        assert_eq!(store.get(), ThemePreference::Light);
    }
}
