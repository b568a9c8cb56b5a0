use std::collections::BTreeMap;

use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::instrument;

use super::repo_types::DailyNutrition;
use super::store::MealStore;

/// `yyyy-MM-dd`
pub fn day_key(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Read-only totals over the meal store.
#[derive(Clone)]
pub struct NutritionAggregator {
    meals: MealStore,
}

impl NutritionAggregator {
    pub fn new(meals: MealStore) -> Self {
        Self { meals }
    }

    /// Totals for one local calendar day; zeros and no meals when nothing was logged.
    #[instrument(skip(self))]
    pub async fn get_daily_nutrition(&self, date: Date) -> DailyNutrition {
        let mut day = DailyNutrition::empty(day_key(date));
        for meal in self.meals.get_meals_by_date(date).await {
            day.push(meal);
        }
        day
    }

    /// One entry per local day in `[start, end]` that has meals, newest day first.
    /// Days without meals are left out.
    #[instrument(skip(self))]
    pub async fn get_nutrition_summary(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Vec<DailyNutrition> {
        let offset = self.meals.offset();
        let mut days: BTreeMap<Date, DailyNutrition> = BTreeMap::new();
        for meal in self.meals.get_all_meals().await {
            if meal.date < start || meal.date > end {
                continue;
            }
            let local_day = meal.date.to_offset(offset).date();
            days.entry(local_day)
                .or_insert_with(|| DailyNutrition::empty(day_key(local_day)))
                .push(meal);
        }
        days.into_values().rev().collect()
    }
}

#[cfg(test)]
mod nutrition_tests {
    use std::sync::Arc;

    use time::macros::{date, datetime, offset};

    use super::*;
    use crate::config::RetentionPolicy;
    use crate::meals::store::store_tests::{memory_store, new_meal};
    use crate::storage::MemoryStorage;

    #[test]
    fn day_key_is_zero_padded() {
        assert_eq!(day_key(date!(2024-01-02)), "2024-01-02");
        assert_eq!(day_key(date!(2024-11-05)), "2024-11-05");
    }

    #[tokio::test]
    async fn daily_nutrition_picks_exactly_that_day() {
        let store = memory_store();
        for (d, cal) in [
            (datetime!(2024-01-01 12:00:00 UTC), 100.0),
            (datetime!(2024-01-02 12:00:00 UTC), 200.0),
            (datetime!(2024-01-03 12:00:00 UTC), 300.0),
        ] {
            store.save_meal(new_meal("meal", d, cal)).await.unwrap();
        }
        let agg = NutritionAggregator::new(store);

        let day = agg.get_daily_nutrition(date!(2024-01-02)).await;
        assert_eq!(day.date, "2024-01-02");
        assert_eq!(day.total_calories, 200.0);
        assert_eq!(day.meals.len(), 1);
        assert_eq!(day.meals[0].date, datetime!(2024-01-02 12:00:00 UTC));
    }

    #[tokio::test]
    async fn daily_nutrition_sums_all_macros() {
        let store = memory_store();
        store
            .save_meal(new_meal("breakfast", datetime!(2024-05-05 07:00:00 UTC), 350.0))
            .await
            .unwrap();
        store
            .save_meal(new_meal("dinner", datetime!(2024-05-05 19:00:00 UTC), 800.0))
            .await
            .unwrap();
        let day = NutritionAggregator::new(store)
            .get_daily_nutrition(date!(2024-05-05))
            .await;
        assert_eq!(day.total_calories, 1150.0);
        assert_eq!(day.total_protein, 20.0);
        assert_eq!(day.total_carbs, 40.0);
        assert_eq!(day.total_fat, 10.0);
        assert_eq!(day.meals[0].name, "dinner");
    }

    #[tokio::test]
    async fn empty_day_is_all_zero() {
        let day = NutritionAggregator::new(memory_store())
            .get_daily_nutrition(date!(2024-01-02))
            .await;
        assert_eq!(day, DailyNutrition::empty("2024-01-02".into()));
    }

    #[tokio::test]
    async fn summary_groups_by_day_and_skips_empty_days() {
        let store = memory_store();
        for (d, cal) in [
            (datetime!(2024-01-01 08:00:00 UTC), 100.0),
            (datetime!(2024-01-01 20:00:00 UTC), 150.0),
            (datetime!(2024-01-03 12:00:00 UTC), 300.0),
            (datetime!(2024-01-09 12:00:00 UTC), 999.0),
        ] {
            store.save_meal(new_meal("m", d, cal)).await.unwrap();
        }
        let summary = NutritionAggregator::new(store)
            .get_nutrition_summary(
                datetime!(2024-01-01 00:00:00 UTC),
                datetime!(2024-01-07 23:59:59 UTC),
            )
            .await;

        let keys: Vec<&str> = summary.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(keys, vec!["2024-01-03", "2024-01-01"]);
        assert_eq!(summary[1].total_calories, 250.0);
        assert_eq!(summary[1].meals.len(), 2);
        assert!(summary.iter().all(|d| !d.meals.is_empty()));
        for day in &summary {
            let sum: f64 = day.meals.iter().map(|m| m.total_calories).sum();
            assert_eq!(day.total_calories, sum);
        }
    }

    #[tokio::test]
    async fn summary_range_is_inclusive_at_both_ends() {
        let start = datetime!(2024-01-01 00:00:00 UTC);
        let end = datetime!(2024-01-07 23:59:59 UTC);
        let one_ns = time::Duration::nanoseconds(1);

        let store = memory_store();
        for (d, cal) in [
            (start, 100.0),
            (end, 200.0),
            (start - one_ns, 40.0),
            (end + one_ns, 80.0),
        ] {
            store.save_meal(new_meal("edge", d, cal)).await.unwrap();
        }
        let summary = NutritionAggregator::new(store)
            .get_nutrition_summary(start, end)
            .await;

        let days: Vec<(&str, f64, usize)> = summary
            .iter()
            .map(|d| (d.date.as_str(), d.total_calories, d.meals.len()))
            .collect();
        assert_eq!(days, vec![("2024-01-07", 200.0, 1), ("2024-01-01", 100.0, 1)]);
    }

    #[tokio::test]
    async fn summary_groups_on_local_calendar_day() {
        let store = MealStore::new(
            Arc::new(MemoryStorage::new()),
            RetentionPolicy::default(),
            offset!(-5),
        );
        // 02:00 UTC on the 2nd is still the 1st at -05:00
        store
            .save_meal(new_meal("late", datetime!(2024-01-02 02:00:00 UTC), 400.0))
            .await
            .unwrap();
        let summary = NutritionAggregator::new(store)
            .get_nutrition_summary(
                datetime!(2023-12-31 00:00:00 UTC),
                datetime!(2024-01-05 00:00:00 UTC),
            )
            .await;
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].date, "2024-01-01");
    }
}
