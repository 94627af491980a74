use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::api::{PairingSource, RecipeCatalog};
use crate::db::StoreError;
use crate::favorites::FavoritesStore;
use crate::recipe::{fallback_source_url, Category, FavoriteRecipe, Recipe};
use crate::theme::{ThemePreference, ThemeStore};

pub const DEFAULT_PAIRING: &str = "Lemonade";
pub const NO_INSTRUCTIONS: &str = "No instructions provided.";
pub const NO_RESULTS: &str = "No recipes found.";
pub const NO_FAVORITES: &str = "No saved recipes yet.";
pub const CONNECTION_ERROR: &str = "Connection error.";
pub const FAVORITES_TITLE: &str = "My Favorite Recipes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Idle,
    Loading,
    Rendered,
    Error,
}

/// Summary shown for one recipe in a result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeCard {
    pub id: String,
    pub name: String,
    pub thumbnail: String,
    pub area: String,
    pub category: String,
    pub source_link: String,
}

impl From<&Recipe> for RecipeCard {
    fn from(recipe: &Recipe) -> Self {
        RecipeCard {
            id: recipe.id.clone(),
            name: recipe.name.clone(),
            thumbnail: recipe.thumbnail.clone(),
            area: recipe.area_or_default().to_string(),
            category: recipe.category_or_default().to_string(),
            source_link: recipe.source_link(),
        }
    }
}

impl From<&FavoriteRecipe> for RecipeCard {
    fn from(fav: &FavoriteRecipe) -> Self {
        RecipeCard {
            id: fav.id.clone(),
            name: fav.name.clone(),
            thumbnail: fav.thumbnail.clone(),
            area: fav.area.clone(),
            category: fav.category.clone(),
            source_link: fallback_source_url(&fav.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsBody {
    Cards(Vec<RecipeCard>),
    Empty(&'static str),
    Error(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsView {
    pub generation: u64,
    pub title: String,
    pub body: ResultsBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Current(ResultsView),
    /// A newer request started while this one was in flight.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientLine {
    pub name: String,
    pub measure: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    pub id: String,
    pub name: String,
    pub thumbnail: String,
    pub pairing: String,
    pub ingredients: Vec<IngredientLine>,
    pub instructions: Vec<String>,
    pub source_link: String,
    pub is_favorite: bool,
}

/// Result of the detail view's Save/Remove button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteToggle {
    pub id: String,
    pub is_favorite: bool,
    pub source_link: String,
}

#[derive(Error, Debug)]
pub enum DetailError {
    #[error("Recipe {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

enum Query {
    Search(String),
    Filter(String),
}

struct State {
    view: ViewState,
    detail: Option<Recipe>,
}

/// Drives one user's query, render and detail cycle.
pub struct Controller {
    catalog: Arc<dyn RecipeCatalog>,
    pairing: Arc<dyn PairingSource>,
    favorites: FavoritesStore,
    theme: ThemeStore,
    home_query: String,
    generation: AtomicU64,
    state: Mutex<State>,
}

impl Controller {
    pub fn new(
        catalog: Arc<dyn RecipeCatalog>,
        pairing: Arc<dyn PairingSource>,
        favorites: FavoritesStore,
        theme: ThemeStore,
        home_query: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            pairing,
            favorites,
            theme,
            home_query: home_query.into(),
            generation: AtomicU64::new(0),
            state: Mutex::new(State {
                view: ViewState::Idle,
                detail: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn view_state(&self) -> ViewState {
        self.state().view
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    // The bump and the Loading write happen under the state lock so a commit
    // of a newer request can never be overwritten by an older begin.
    fn begin(&self) -> u64 {
        let mut state = self.state();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        state.view = ViewState::Loading;
        generation
    }

    fn commit(&self, view: ResultsView) -> Outcome {
        let mut state = self.state();
        if !self.is_current(view.generation) {
            log::debug!(
                "Dropping results of request {} superseded by {}",
                view.generation,
                self.generation()
            );
            return Outcome::Superseded;
        }
        state.view = match view.body {
            ResultsBody::Error(_) => ViewState::Error,
            _ => ViewState::Rendered,
        };
        Outcome::Current(view)
    }

    pub async fn search(&self, query: &str) -> Outcome {
        self.run(Query::Search(query.to_string())).await
    }

    pub async fn filter(&self, category: &str) -> Outcome {
        self.run(Query::Filter(category.to_string())).await
    }

    pub async fn home(&self) -> Outcome {
        self.run(Query::Search(self.home_query.clone())).await
    }

    async fn run(&self, query: Query) -> Outcome {
        let generation = self.begin();
        let (title, result) = match &query {
            Query::Search(q) => (
                format!("Results for \"{}\"", q),
                self.catalog.search_by_name(q).await,
            ),
            Query::Filter(c) => (
                format!("Category: {}", c),
                self.catalog.filter_by_category(c).await,
            ),
        };
        let body = match result {
            Ok(Some(meals)) if !meals.is_empty() => {
                ResultsBody::Cards(meals.iter().map(RecipeCard::from).collect())
            }
            Ok(_) => ResultsBody::Empty(NO_RESULTS),
            Err(e) => {
                log::error!("Request {} failed: {}", generation, e);
                ResultsBody::Error(CONNECTION_ERROR)
            }
        };
        self.commit(ResultsView {
            generation,
            title,
            body,
        })
    }

    pub fn show_favorites(&self) -> Outcome {
        let generation = self.begin();
        let favorites = self.favorites.list();
        let body = if favorites.is_empty() {
            ResultsBody::Empty(NO_FAVORITES)
        } else {
            ResultsBody::Cards(favorites.iter().map(RecipeCard::from).collect())
        };
        self.commit(ResultsView {
            generation,
            title: FAVORITES_TITLE.to_string(),
            body,
        })
    }

    pub async fn categories(&self) -> Vec<Category> {
        self.catalog.list_categories().await
    }

    /// Fetches a recipe and a drink pairing. On failure the current view is
    /// left untouched.
    pub async fn open_details(&self, id: &str) -> Result<DetailView, DetailError> {
        let (recipe, pairing) =
            tokio::join!(self.catalog.get_by_id(id), self.pairing.random_pairing());
        let recipe = recipe.ok_or_else(|| DetailError::NotFound(id.to_string()))?;

        let view = DetailView {
            id: recipe.id.clone(),
            name: recipe.name.clone(),
            thumbnail: recipe.thumbnail.clone(),
            pairing: pairing
                .map(|p| p.drink)
                .unwrap_or_else(|| DEFAULT_PAIRING.to_string()),
            ingredients: ingredient_lines(&recipe),
            instructions: instruction_paragraphs(recipe.instructions.as_deref()),
            source_link: recipe.source_link(),
            is_favorite: self.favorites.contains(&recipe.id),
        };
        self.state().detail = Some(recipe);
        Ok(view)
    }

    /// Toggles the recipe in the favorites, reusing the open detail record
    /// when it matches.
    pub async fn toggle_favorite(&self, id: &str) -> Result<FavoriteToggle, DetailError> {
        let cached = self
            .state()
            .detail
            .as_ref()
            .filter(|recipe| recipe.id == id)
            .cloned();
        let recipe = match cached {
            Some(recipe) => recipe,
            None => self
                .catalog
                .get_by_id(id)
                .await
                .ok_or_else(|| DetailError::NotFound(id.to_string()))?,
        };
        let is_favorite = self.favorites.toggle(&recipe)?;
        Ok(FavoriteToggle {
            id: recipe.id.clone(),
            is_favorite,
            source_link: recipe.source_link(),
        })
    }

    pub fn favorites_count(&self) -> usize {
        self.favorites.count()
    }

    pub fn theme(&self) -> ThemePreference {
        self.theme.get()
    }

    pub fn toggle_theme(&self) -> Result<ThemePreference, StoreError> {
        self.theme.toggle()
    }
}

/// Non-blank ingredient slots in slot order.
pub fn ingredient_lines(recipe: &Recipe) -> Vec<IngredientLine> {
    recipe
        .slots
        .iter()
        .filter_map(|slot| {
            let name = slot.ingredient.as_deref().filter(|s| !s.trim().is_empty())?;
            Some(IngredientLine {
                name: name.to_string(),
                measure: slot.measure.clone().unwrap_or_default(),
            })
        })
        .collect()
}

pub fn instruction_paragraphs(instructions: Option<&str>) -> Vec<String> {
    instructions
        .unwrap_or(NO_INSTRUCTIONS)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
