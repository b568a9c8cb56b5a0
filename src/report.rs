use std::collections::BTreeMap;

use serde::Serialize;
use time::{Date, Duration};

use crate::meals::nutrition::day_key;
use crate::meals::MealStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: String,
    pub calories: f64,
    pub protein: f64,
}

/// Calories and protein for every day of the window ending at `last_day`,
/// oldest first. Days without meals appear with zeros, unlike
/// `NutritionAggregator::get_nutrition_summary`.
pub async fn daily_chart(meals: &MealStore, last_day: Date, days: u16) -> Vec<ChartPoint> {
    if days == 0 {
        return Vec::new();
    }
    let first_day = last_day - Duration::days(i64::from(days) - 1);

    let mut series: BTreeMap<Date, ChartPoint> = BTreeMap::new();
    let mut day = first_day;
    while day <= last_day {
        series.insert(
            day,
            ChartPoint {
                date: day_key(day),
                calories: 0.0,
                protein: 0.0,
            },
        );
        day += Duration::days(1);
    }

    for meal in meals.get_all_meals().await {
        let local_day = meal.date.to_offset(meals.offset()).date();
        if let Some(point) = series.get_mut(&local_day) {
            point.calories += meal.total_calories;
            point.protein += meal.total_protein;
        }
    }
    series.into_values().collect()
}
