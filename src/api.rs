use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::recipe::{self, Category, PairingSuggestion, Recipe};

pub const MEAL_API: &str = "https://www.themealdb.com/api/json/v1/1";
pub const DRINK_API: &str = "https://www.thecocktaildb.com/api/json/v1/1";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read access to the recipe catalog.
#[async_trait]
pub trait RecipeCatalog: Send + Sync {
    async fn search_by_name(&self, query: &str) -> Result<Option<Vec<Recipe>>, CatalogError>;

    async fn filter_by_category(
        &self,
        category: &str,
    ) -> Result<Option<Vec<Recipe>>, CatalogError>;

    /// Never fails: an unreachable catalog yields no categories.
    async fn list_categories(&self) -> Vec<Category>;

    /// Never fails: errors and unknown ids both yield `None`.
    async fn get_by_id(&self, id: &str) -> Option<Recipe>;
}

#[async_trait]
pub trait PairingSource: Send + Sync {
    async fn random_pairing(&self) -> Option<PairingSuggestion>;
}

async fn get_body(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<String, CatalogError> {
    log::debug!("GET {} {:?}", url, query);
    let response = client.get(url).query(query).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CatalogError::Status(status));
    }
    Ok(response.text().await?)
}

pub struct MealDbClient {
    client: Client,
    base_url: String,
}

impl MealDbClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn meals(
        &self,
        path: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<Vec<Recipe>>, CatalogError> {
        let body = get_body(&self.client, &self.endpoint(path), &[(key, value)]).await?;
        Ok(recipe::parse_meals(&body)?)
    }
}

#[async_trait]
impl RecipeCatalog for MealDbClient {
    async fn search_by_name(&self, query: &str) -> Result<Option<Vec<Recipe>>, CatalogError> {
        self.meals("search.php", "s", query).await.map_err(|e| {
            log::error!("Error fetching meals for {:?}: {}", query, e);
            e
        })
    }

    async fn filter_by_category(
        &self,
        category: &str,
    ) -> Result<Option<Vec<Recipe>>, CatalogError> {
        self.meals("filter.php", "c", category).await.map_err(|e| {
            log::error!("Error filtering category {:?}: {}", category, e);
            e
        })
    }

    async fn list_categories(&self) -> Vec<Category> {
        let result = match get_body(&self.client, &self.endpoint("list.php"), &[("c", "list")]).await
        {
            Ok(body) => recipe::parse_categories(&body).map_err(CatalogError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(categories) => categories,
            Err(e) => {
                log::error!("Error fetching categories: {}", e);
                Vec::new()
            }
        }
    }

    async fn get_by_id(&self, id: &str) -> Option<Recipe> {
        match self.meals("lookup.php", "i", id).await {
            Ok(meals) => meals.and_then(|meals| meals.into_iter().next()),
            Err(e) => {
                log::error!("Error fetching details for {}: {}", id, e);
                None
            }
        }
    }
}

pub struct CocktailDbClient {
    client: Client,
    base_url: String,
}

impl CocktailDbClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PairingSource for CocktailDbClient {
    async fn random_pairing(&self) -> Option<PairingSuggestion> {
        let url = format!("{}/random.php", self.base_url);
        let result = match get_body(&self.client, &url, &[]).await {
            Ok(body) => recipe::parse_pairing(&body).map_err(CatalogError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(drink) => drink,
            Err(e) => {
                log::error!("Error fetching drink: {}", e);
                None
            }
        }
    }
}
