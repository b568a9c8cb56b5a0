use std::collections::BTreeMap;
use std::sync::Arc;

use time::{Date, OffsetDateTime, UtcOffset};
use tokio::sync::Mutex;
use tracing::{error, instrument};

use super::{calories_for_steps, ActivityData};
use crate::config::ActivityGoals;
use crate::meals::nutrition::day_key;
use crate::storage::{LocalStorage, StorageError};

pub const ACTIVITY_KEY: &str = "activity_data";

/// Per-day steps and water, stored as one JSON map keyed by `yyyy-MM-dd`.
#[derive(Clone)]
pub struct ActivityStore {
    storage: Arc<dyn LocalStorage>,
    goals: ActivityGoals,
    offset: UtcOffset,
    write_lock: Arc<Mutex<()>>,
}

impl ActivityStore {
    pub fn new(storage: Arc<dyn LocalStorage>, goals: ActivityGoals, offset: UtcOffset) -> Self {
        Self {
            storage,
            goals,
            offset,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn today(&self) -> Date {
        OffsetDateTime::now_utc().to_offset(self.offset).date()
    }

    async fn load(&self) -> Result<BTreeMap<String, ActivityData>, StorageError> {
        let Some(blob) = self.storage.get_item(ACTIVITY_KEY).await? else {
            return Ok(BTreeMap::new());
        };
        Ok(serde_json::from_str(&blob).unwrap_or_else(|e| {
            error!(error = %e, "error parsing activity data; treating history as empty");
            BTreeMap::new()
        }))
    }

    /// Unreadable history is logged and reported as empty.
    pub async fn get_all_activities(&self) -> BTreeMap<String, ActivityData> {
        self.load().await.unwrap_or_else(|e| {
            error!(error = %e, "error reading activity data; treating history as empty");
            BTreeMap::new()
        })
    }

    pub async fn activity_for(&self, date: Date) -> ActivityData {
        let key = day_key(date);
        self.get_all_activities()
            .await
            .remove(&key)
            .unwrap_or_else(|| ActivityData::empty(key))
    }

    pub async fn today_activity(&self) -> ActivityData {
        self.activity_for(self.today()).await
    }

    async fn update(
        &self,
        date: Date,
        apply: impl FnOnce(&mut ActivityData),
    ) -> Result<ActivityData, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.load().await?;
        let key = day_key(date);
        let entry = all
            .entry(key.clone())
            .or_insert_with(|| ActivityData::empty(key));
        apply(entry);
        let updated = entry.clone();

        let blob = serde_json::to_string(&all).map_err(|e| StorageError::Backend(e.into()))?;
        self.storage.set_item(ACTIVITY_KEY, &blob).await?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn add_steps(&self, date: Date, steps: u32) -> Result<ActivityData, StorageError> {
        self.update(date, |day| {
            day.steps = day.steps.saturating_add(steps);
            day.calories_burned = calories_for_steps(day.steps);
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn add_water(&self, date: Date, millilitres: u32) -> Result<ActivityData, StorageError> {
        self.update(date, |day| {
            day.water_intake = day.water_intake.saturating_add(millilitres);
        })
        .await
    }

    /// Percent of the daily water goal; can exceed 100.
    pub async fn water_progress(&self, date: Date) -> f64 {
        let day = self.activity_for(date).await;
        percent(day.water_intake, self.goals.water_ml)
    }

    /// Percent of the daily step goal; can exceed 100.
    pub async fn steps_progress(&self, date: Date) -> f64 {
        let day = self.activity_for(date).await;
        percent(day.steps, self.goals.steps)
    }
}

fn percent(value: u32, goal: u32) -> f64 {
    if goal == 0 {
        return 0.0;
    }
    f64::from(value) / f64::from(goal) * 100.0
}

#[cfg(test)]
mod activity_tests {
    use time::macros::date;

    use super::*;
    use crate::storage::MemoryStorage;

    fn store_with(storage: Arc<MemoryStorage>) -> ActivityStore {
        ActivityStore::new(storage, ActivityGoals::default(), UtcOffset::UTC)
    }

    #[tokio::test]
    async fn unknown_day_is_empty() {
        let store = store_with(Arc::new(MemoryStorage::new()));
        assert_eq!(
            store.activity_for(date!(2024-03-01)).await,
            ActivityData::empty("2024-03-01".into())
        );
    }

    #[tokio::test]
    async fn steps_accumulate_and_drive_calories() {
        let store = store_with(Arc::new(MemoryStorage::new()));
        let d = date!(2024-03-01);
        store.add_steps(d, 1_000).await.unwrap();
        let day = store.add_steps(d, 1_530).await.unwrap();
        assert_eq!(day.steps, 2_530);
        // 2530 * 0.04 = 101.2
        assert_eq!(day.calories_burned, 101);
        assert_eq!(store.activity_for(d).await, day);
        assert!((store.steps_progress(d).await - 25.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn water_is_tracked_per_day() {
        let store = store_with(Arc::new(MemoryStorage::new()));
        store.add_water(date!(2024-03-01), 500).await.unwrap();
        store.add_water(date!(2024-03-01), 750).await.unwrap();
        store.add_water(date!(2024-03-02), 250).await.unwrap();
        assert_eq!(store.activity_for(date!(2024-03-01)).await.water_intake, 1_250);
        assert_eq!(store.water_progress(date!(2024-03-01)).await, 50.0);
        assert_eq!(store.get_all_activities().await.len(), 2);
    }

    #[tokio::test]
    async fn stored_shape_matches_activity_key_layout() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone());
        store.add_water(date!(2024-03-01), 300).await.unwrap();
        let raw = storage.get_item(ACTIVITY_KEY).await.unwrap().unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["2024-03-01"]["waterIntake"], 300);
        assert_eq!(v["2024-03-01"]["caloriesBurned"], 0);
    }

    #[tokio::test]
    async fn corrupt_history_reads_empty_and_is_replaced_on_write() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(ACTIVITY_KEY, "[oops").await.unwrap();
        let store = store_with(storage);
        assert!(store.get_all_activities().await.is_empty());
        let day = store.add_steps(date!(2024-03-01), 10).await.unwrap();
        assert_eq!(day.steps, 10);
        assert_eq!(store.get_all_activities().await.len(), 1);
    }

    #[tokio::test]
    async fn quota_error_surfaces_on_write() {
        let store = store_with(Arc::new(MemoryStorage::with_quota(8)));
        let err = store.add_water(date!(2024-03-01), 100).await.unwrap_err();
        assert!(err.is_quota());
    }

    #[test]
    fn zero_goal_has_zero_progress() {
        assert_eq!(percent(500, 0), 0.0);
    }
}
