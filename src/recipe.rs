use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of ingredient/measure slots a TheMealDB record carries.
pub const SLOT_COUNT: usize = 20;
pub const DEFAULT_AREA: &str = "Fine Dining";
pub const DEFAULT_CATEGORY: &str = "Recipe";
pub const FALLBACK_SOURCE_BASE: &str = "https://www.themealdb.com/meal";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngredientSlot {
    pub ingredient: Option<String>,
    pub measure: Option<String>,
}

/// A full dish record as returned by the catalog. Blank upstream strings are
/// stored as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub thumbnail: String,
    pub area: Option<String>,
    pub category: Option<String>,
    pub slots: Vec<IngredientSlot>,
    pub instructions: Option<String>,
    pub source: Option<String>,
    pub video: Option<String>,
}

impl Recipe {
    /// Builds a recipe out of one entry of a `meals` array. Entries without an
    /// identifier or a name are rejected.
    pub fn from_json(item: &Map<String, Value>) -> Option<Recipe> {
        let id = text(item, "idMeal")?;
        let name = text(item, "strMeal")?;
        let slots = (1..=SLOT_COUNT)
            .map(|i| IngredientSlot {
                ingredient: text(item, &format!("strIngredient{}", i)),
                measure: text(item, &format!("strMeasure{}", i)),
            })
            .collect();
        Some(Recipe {
            id,
            name,
            thumbnail: text(item, "strMealThumb").unwrap_or_default(),
            area: text(item, "strArea"),
            category: text(item, "strCategory"),
            slots,
            instructions: text(item, "strInstructions"),
            source: text(item, "strSource"),
            video: text(item, "strYoutube"),
        })
    }

    pub fn area_or_default(&self) -> &str {
        self.area.as_deref().unwrap_or(DEFAULT_AREA)
    }

    pub fn category_or_default(&self) -> &str {
        self.category.as_deref().unwrap_or(DEFAULT_CATEGORY)
    }

    /// Source URL, else video URL, else the catalog page of the recipe.
    pub fn source_link(&self) -> String {
        self.source
            .clone()
            .or_else(|| self.video.clone())
            .unwrap_or_else(|| fallback_source_url(&self.id))
    }
}

pub fn fallback_source_url(id: &str) -> String {
    format!("{}/{}", FALLBACK_SOURCE_BASE, id)
}

/// Minified recipe kept in the favorites list. Field names follow the
/// upstream record so the stored array matches what the catalog returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteRecipe {
    #[serde(rename = "idMeal")]
    pub id: String,
    #[serde(rename = "strMeal")]
    pub name: String,
    #[serde(rename = "strMealThumb", default)]
    pub thumbnail: String,
    #[serde(rename = "strArea", default = "default_area")]
    pub area: String,
    #[serde(rename = "strCategory", default = "default_category")]
    pub category: String,
}

fn default_area() -> String {
    DEFAULT_AREA.to_string()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl From<&Recipe> for FavoriteRecipe {
    fn from(recipe: &Recipe) -> Self {
        FavoriteRecipe {
            id: recipe.id.clone(),
            name: recipe.name.clone(),
            thumbnail: recipe.thumbnail.clone(),
            area: recipe.area_or_default().to_string(),
            category: recipe.category_or_default().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingSuggestion {
    pub drink: String,
}

#[derive(Debug, Deserialize)]
struct MealsEnvelope {
    meals: Option<Vec<Map<String, Value>>>,
}

#[derive(Debug, Deserialize)]
struct DrinksEnvelope {
    drinks: Option<Vec<Map<String, Value>>>,
}

/// Parses a `{ "meals": [...] | null }` body. A null array is `None`.
pub fn parse_meals(body: &str) -> serde_json::Result<Option<Vec<Recipe>>> {
    let envelope: MealsEnvelope = serde_json::from_str(body)?;
    Ok(envelope.meals.map(|items| {
        items
            .iter()
            .filter_map(|item| {
                let recipe = Recipe::from_json(item);
                if recipe.is_none() {
                    log::warn!("Skipping meal without id or name: {:?}", item);
                }
                recipe
            })
            .collect()
    }))
}

pub fn parse_categories(body: &str) -> serde_json::Result<Vec<Category>> {
    let envelope: MealsEnvelope = serde_json::from_str(body)?;
    Ok(envelope
        .meals
        .unwrap_or_default()
        .iter()
        .filter_map(|item| text(item, "strCategory"))
        .map(|name| Category { name })
        .collect())
}

pub fn parse_pairing(body: &str) -> serde_json::Result<Option<PairingSuggestion>> {
    let envelope: DrinksEnvelope = serde_json::from_str(body)?;
    Ok(envelope
        .drinks
        .unwrap_or_default()
        .first()
        .and_then(|item| text(item, "strDrink"))
        .map(|drink| PairingSuggestion { drink }))
}

fn text(item: &Map<String, Value>, key: &str) -> Option<String> {
    match item.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn recipe(id: &str, name: &str) -> Recipe {
        Recipe {
            id: id.to_string(),
            name: name.to_string(),
            thumbnail: format!("https://img.example/{}.jpg", id),
            area: None,
            category: None,
            slots: vec![IngredientSlot::default(); SLOT_COUNT],
            instructions: None,
            source: None,
            video: None,
        }
    }

    #[test]
    fn parses_full_meal_and_normalizes_blanks() {
        let body = r#"{"meals":[{
            "idMeal":"52772","strMeal":"Teriyaki Chicken Casserole",
            "strMealThumb":"https://www.themealdb.com/images/media/meals/wvpsxx1468256321.jpg",
            "strArea":"Japanese","strCategory":"Chicken",
            "strInstructions":"Preheat oven.\r\n\r\nBake.",
            "strIngredient1":"soy sauce","strMeasure1":"3/4 cup",
            "strIngredient2":"  ","strMeasure2":" ",
            "strIngredient3":null,"strMeasure3":null,
            "strSource":"","strYoutube":"https://www.youtube.com/watch?v=4aZr5hZXP_s"
        }]}"#;
        let meals = parse_meals(body).unwrap().unwrap();
        assert_eq!(meals.len(), 1);
        let meal = &meals[0];
        assert_eq!(meal.id, "52772");
        assert_eq!(meal.area.as_deref(), Some("Japanese"));
        assert_eq!(meal.slots.len(), SLOT_COUNT);
        assert_eq!(meal.slots[0].ingredient.as_deref(), Some("soy sauce"));
        assert_eq!(meal.slots[1], IngredientSlot::default());
        assert_eq!(meal.source, None);
        assert_eq!(
            meal.source_link(),
            "https://www.youtube.com/watch?v=4aZr5hZXP_s"
        );
    }

    #[test]
    fn null_meals_is_absent() {
        assert_eq!(parse_meals(r#"{"meals":null}"#).unwrap(), None);
    }

    #[test]
    fn filter_results_carry_only_summary_fields() {
        let body = r#"{"meals":[{"strMeal":"Beef Wellington","strMealThumb":"t.jpg","idMeal":"52803"}]}"#;
        let meal = &parse_meals(body).unwrap().unwrap()[0];
        assert_eq!(meal.area_or_default(), DEFAULT_AREA);
        assert_eq!(meal.category_or_default(), DEFAULT_CATEGORY);
        assert_eq!(meal.instructions, None);
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_meals("<html>").is_err());
    }

    #[test]
    fn source_link_fallback_order() {
        let mut meal = recipe("1", "Soup");
        assert_eq!(meal.source_link(), "https://www.themealdb.com/meal/1");
        meal.video = Some("https://video.example/1".to_string());
        assert_eq!(meal.source_link(), "https://video.example/1");
        meal.source = Some("https://source.example/1".to_string());
        assert_eq!(meal.source_link(), "https://source.example/1");
    }

    #[test]
    fn projection_applies_defaults() {
        let mut meal = recipe("7", "Stew");
        let fav = FavoriteRecipe::from(&meal);
        assert_eq!(fav.area, "Fine Dining");
        assert_eq!(fav.category, "Recipe");

        meal.area = Some("Irish".to_string());
        meal.category = Some("Beef".to_string());
        let fav = FavoriteRecipe::from(&meal);
        assert_eq!(fav.area, "Irish");
        assert_eq!(fav.category, "Beef");
    }

    #[test]
    fn favorite_serializes_with_upstream_names() {
        let fav = FavoriteRecipe::from(&recipe("9", "Pie"));
        let json = serde_json::to_string(&fav).unwrap();
        assert_eq!(
            json,
            r#"{"idMeal":"9","strMeal":"Pie","strMealThumb":"https://img.example/9.jpg","strArea":"Fine Dining","strCategory":"Recipe"}"#
        );
    }

    #[test]
    fn favorite_missing_optional_fields_gets_defaults() {
        let fav: FavoriteRecipe = serde_json::from_str(r#"{"idMeal":"9","strMeal":"Pie"}"#).unwrap();
        assert_eq!(fav.thumbnail, "");
        assert_eq!(fav.area, DEFAULT_AREA);
        assert_eq!(fav.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn parses_categories_and_pairing() {
        let cats = parse_categories(r#"{"meals":[{"strCategory":"Beef"},{"strCategory":"Dessert"}]}"#)
            .unwrap();
        assert_eq!(
            cats,
            vec![
                Category { name: "Beef".to_string() },
                Category { name: "Dessert".to_string() }
            ]
        );
        let drink = parse_pairing(r#"{"drinks":[{"idDrink":"1","strDrink":"Mojito"}]}"#).unwrap();
        assert_eq!(drink.unwrap().drink, "Mojito");
        assert_eq!(parse_pairing(r#"{"drinks":null}"#).unwrap(), None);
    }
}
