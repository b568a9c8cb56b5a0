use futures_util::future::join_all;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, instrument};

use super::repo_types::{FoodItem, Macros, Meal, NewMeal};
use super::store::{MealStore, MealStoreError};
use crate::ai::{AnalysisError, DetectedFood, FoodAnalyzer};
use crate::lookup::NutritionLookup;

/// How each detected item gets its nutrition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstimationStrategy {
    /// Ask the analyzer directly for the item and portion.
    #[default]
    Direct,
    /// Look the item up in the food database, then have the analyzer refine it.
    LookupAndRefine,
}

/// A meal assembled from analysis, not yet saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealDraft {
    pub name: String,
    pub food_items: Vec<FoodItem>,
    pub totals: Macros,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl MealDraft {
    /// Items with unknown nutrition count as zero in the totals.
    pub fn from_items(food_items: Vec<FoodItem>, image_url: Option<String>) -> Self {
        let totals = food_items
            .iter()
            .filter_map(|item| item.nutrition)
            .fold(Macros::ZERO, |acc, m| acc + m);
        let name = food_items
            .iter()
            .map(|item| item.name.as_str())
            .collect::<Vec<_>>()
            .join(" + ");
        Self {
            name,
            food_items,
            totals,
            image_url,
        }
    }

    pub fn into_new_meal(self, description: String, date: OffsetDateTime) -> NewMeal {
        NewMeal {
            name: self.name,
            description,
            date,
            food_items: self.food_items,
            total_calories: self.totals.calories,
            total_protein: self.totals.protein,
            total_carbs: self.totals.carbohydrates,
            total_fat: self.totals.fat,
            image_url: self.image_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthyAlternatives {
    pub alternatives: Vec<String>,
    pub nutrition: Macros,
}

fn placeholder(food: DetectedFood) -> FoodItem {
    FoodItem {
        name: food.name,
        portion_size: food.portion_size,
        nutrition: None,
        confidence: 0.0,
    }
}

async fn estimate_item(
    analyzer: &dyn FoodAnalyzer,
    lookup: &dyn NutritionLookup,
    strategy: EstimationStrategy,
    food: DetectedFood,
) -> FoodItem {
    let estimated = match strategy {
        EstimationStrategy::Direct => analyzer
            .analyze_nutrition(&food.name, &food.portion_size)
            .await
            .map(|est| (est.macros, est.confidence)),
        EstimationStrategy::LookupAndRefine => {
            let raw = lookup.get_nutrition(&food.name).await;
            // refined values carry no model confidence
            analyzer
                .refine_nutrition_data(&food.name, raw)
                .await
                .map(|m| (m, 0.0))
        }
    };

    match estimated {
        Ok((macros, confidence)) => FoodItem {
            name: food.name,
            portion_size: food.portion_size,
            nutrition: Some(macros),
            confidence,
        },
        Err(e) => {
            error!(error = %e, food = %food.name, "failed to get nutrition info");
            placeholder(food)
        }
    }
}

/// Identifies the foods in a photo and estimates each one concurrently.
///
/// Identification failing fails the whole call. A single item failing only
/// turns that item into a placeholder with no nutrition.
#[instrument(skip(analyzer, lookup, photo_url))]
pub async fn analyze_meal_photo(
    analyzer: &dyn FoodAnalyzer,
    lookup: &dyn NutritionLookup,
    strategy: EstimationStrategy,
    photo_url: &str,
) -> Result<MealDraft, AnalysisError> {
    let detected = analyzer.identify_food_from_image(photo_url).await?;
    info!(items = detected.len(), "food identified");

    let items = join_all(
        detected
            .into_iter()
            .map(|food| estimate_item(analyzer, lookup, strategy, food)),
    )
    .await;

    Ok(MealDraft::from_items(items, Some(photo_url.to_string())))
}

/// Saves a draft stamped with the current time.
pub async fn log_meal(
    store: &MealStore,
    draft: MealDraft,
    description: String,
) -> Result<Meal, MealStoreError> {
    store
        .save_meal(draft.into_new_meal(description, OffsetDateTime::now_utc()))
        .await
}

#[instrument(skip(analyzer, lookup))]
pub async fn suggest_alternatives(
    analyzer: &dyn FoodAnalyzer,
    lookup: &dyn NutritionLookup,
    food_name: &str,
) -> Result<HealthyAlternatives, AnalysisError> {
    let nutrition = lookup.get_nutrition(food_name).await;
    let alternatives = analyzer
        .suggest_healthy_alternatives(food_name, nutrition)
        .await?;
    Ok(HealthyAlternatives {
        alternatives,
        nutrition,
    })
}
