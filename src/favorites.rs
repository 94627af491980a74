use std::sync::{Arc, Mutex};

use crate::db::{KeyValueStore, StoreError};
use crate::recipe::{FavoriteRecipe, Recipe};

pub const FAV_KEY: &str = "gastrochef_favorites";

/// Ordered favorites list kept as one JSON array under a single key.
pub struct FavoritesStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    // Serializes read-modify-write cycles on the key.
    write: Mutex<()>,
}

impl FavoritesStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
            write: Mutex::new(()),
        }
    }

    /// Unreadable or malformed data reads as an empty list.
    pub fn list(&self) -> Vec<FavoriteRecipe> {
        let data = match self.kv.get(&self.key) {
            Ok(Some(data)) => data,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::warn!("Could not read {}: {}", self.key, e);
                return Vec::new();
            }
        };
        match serde_json::from_str(&data) {
            Ok(favorites) => favorites,
            Err(e) => {
                log::warn!("Discarding malformed {}: {}", self.key, e);
                Vec::new()
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.list().iter().any(|fav| fav.id == id)
    }

    pub fn count(&self) -> usize {
        self.list().len()
    }

    /// Adds the recipe if absent, removes it otherwise. Returns whether the
    /// recipe is a favorite afterwards.
    pub fn toggle(&self, recipe: &Recipe) -> Result<bool, StoreError> {
        let _guard = self.write.lock().unwrap_or_else(|e| e.into_inner());
        let mut favorites = self.list();
        let added = match favorites.iter().position(|fav| fav.id == recipe.id) {
            Some(index) => {
                favorites.remove(index);
                false
            }
            None => {
                favorites.push(FavoriteRecipe::from(recipe));
                true
            }
        };
        let data = serde_json::to_string(&favorites)?;
        self.kv.set(&self.key, &data)?;
        Ok(added)
    }
}
