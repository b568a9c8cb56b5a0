use std::sync::Arc;

use thiserror::Error;
use time::{macros::time, Date, OffsetDateTime, UtcOffset};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::codec::{decode_blob, encode_blob};
use super::repo_types::{Meal, NewMeal};
use crate::config::RetentionPolicy;
use crate::storage::{LocalStorage, StorageError};

pub const MEALS_KEY: &str = "meals";

#[derive(Debug, Error)]
pub enum MealStoreError {
    #[error("storage quota exceeded even with minimal data (window shrank to {attempted}, floor is {floor})")]
    QuotaExceeded { floor: usize, attempted: usize },
    #[error("failed to save meal after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("encode meals: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid meal: {0}")]
    Invalid(String),
}

/// JSON has no NaN or infinity; such a number would be written as `null`
/// and make the whole stored blob unreadable.
fn ensure_finite(meal: &NewMeal) -> Result<(), MealStoreError> {
    let totals = [
        ("totalCalories", meal.total_calories),
        ("totalProtein", meal.total_protein),
        ("totalCarbs", meal.total_carbs),
        ("totalFat", meal.total_fat),
    ];
    if let Some((field, value)) = totals.iter().find(|(_, v)| !v.is_finite()) {
        return Err(MealStoreError::Invalid(format!("{field} is {value}")));
    }
    for item in &meal.food_items {
        let numbers = item
            .nutrition
            .map(|m| m.to_tuple())
            .unwrap_or_default()
            .into_iter()
            .chain([item.confidence]);
        if numbers.into_iter().any(|v| !v.is_finite()) {
            return Err(MealStoreError::Invalid(format!(
                "food item `{}` has a non-finite number",
                item.name
            )));
        }
    }
    Ok(())
}

/// Owns the persisted meal collection.
///
/// Every call reloads from storage. Writes go through one mutex per store
/// (clones share it), so the read-modify-write in [`MealStore::save_meal`]
/// never drops a concurrent save.
#[derive(Clone)]
pub struct MealStore {
    storage: Arc<dyn LocalStorage>,
    policy: RetentionPolicy,
    offset: UtcOffset,
    write_lock: Arc<Mutex<()>>,
}

impl MealStore {
    pub fn new(storage: Arc<dyn LocalStorage>, policy: RetentionPolicy, offset: UtcOffset) -> Self {
        Self {
            storage,
            policy,
            offset,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// Assigns a fresh id, merges the meal into the stored set (newest first)
    /// and writes the most recent window of it back.
    ///
    /// Meals falling outside the window that finally fits are dropped for good.
    #[instrument(skip(self, meal), fields(meal_name = %meal.name))]
    pub async fn save_meal(&self, meal: NewMeal) -> Result<Meal, MealStoreError> {
        ensure_finite(&meal)?;
        let _guard = self.write_lock.lock().await;

        let mut meals = self.load().await?;
        let mut id = Uuid::new_v4().to_string();
        while meals.iter().any(|m| m.id == id) {
            id = Uuid::new_v4().to_string();
        }
        let saved = meal.with_id(id);
        meals.push(saved.clone());
        meals.sort_by(|a, b| b.date.cmp(&a.date));

        let kept = self.persist(&meals).await?;
        debug!(meal_id = %saved.id, kept, total = meals.len(), "meal saved");
        Ok(saved)
    }

    /// Writes the newest `limit` meals, halving `limit` on every quota
    /// rejection. Returns how many meals were written.
    async fn persist(&self, meals: &[Meal]) -> Result<usize, MealStoreError> {
        let mut limit = self.policy.max_retained;
        let mut attempts = 0;

        while attempts < self.policy.max_retries {
            let window = &meals[..limit.min(meals.len())];
            let blob = encode_blob(window)?;
            match self.storage.set_item(MEALS_KEY, &blob).await {
                Ok(()) => return Ok(window.len()),
                Err(e) if e.is_quota() => {
                    attempts += 1;
                    limit /= 2;
                    warn!(error = %e, attempts, next_limit = limit, "meal storage full; shrinking window");
                    if limit < self.policy.min_retained {
                        return Err(MealStoreError::QuotaExceeded {
                            floor: self.policy.min_retained,
                            attempted: limit,
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(MealStoreError::RetriesExhausted { attempts })
    }

    /// Storage failures propagate; an unreadable blob reads as empty.
    async fn load(&self) -> Result<Vec<Meal>, StorageError> {
        let Some(blob) = self.storage.get_item(MEALS_KEY).await? else {
            return Ok(Vec::new());
        };
        match decode_blob(&blob) {
            Ok(meals) => Ok(meals),
            Err(e) => {
                error!(error = %e, "error parsing meals; treating history as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Never fails: anything unreadable is logged and reported as no meals.
    pub async fn get_all_meals(&self) -> Vec<Meal> {
        match self.load().await {
            Ok(meals) => meals,
            Err(e) => {
                error!(error = %e, "error reading meals; treating history as empty");
                Vec::new()
            }
        }
    }

    pub async fn get_meal_by_id(&self, id: &str) -> Option<Meal> {
        self.get_all_meals().await.into_iter().find(|m| m.id == id)
    }

    /// Meals whose timestamp lies within the local calendar day, both ends inclusive.
    pub async fn get_meals_by_date(&self, date: Date) -> Vec<Meal> {
        let (start, end) = day_bounds(date, self.offset);
        self.get_all_meals()
            .await
            .into_iter()
            .filter(|m| m.date >= start && m.date <= end)
            .collect()
    }
}

/// First and last instant of `date` at `offset`.
pub fn day_bounds(date: Date, offset: UtcOffset) -> (OffsetDateTime, OffsetDateTime) {
    let start = date.midnight().assume_offset(offset);
    let end = date.with_time(time!(23:59:59.999_999_999)).assume_offset(offset);
    (start, end)
}
