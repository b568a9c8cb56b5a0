use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Calories plus protein/carbohydrate/fat grams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub calories: f64,
    pub protein: f64,
    pub carbohydrates: f64,
    pub fat: f64,
}

impl Macros {
    pub const ZERO: Macros = Macros {
        calories: 0.0,
        protein: 0.0,
        carbohydrates: 0.0,
        fat: 0.0,
    };

    /// Always `[calories, protein, carbohydrates, fat]`.
    pub fn to_tuple(self) -> [f64; 4] {
        [self.calories, self.protein, self.carbohydrates, self.fat]
    }

    pub fn from_tuple([calories, protein, carbohydrates, fat]: [f64; 4]) -> Self {
        Self {
            calories,
            protein,
            carbohydrates,
            fat,
        }
    }
}

impl Add for Macros {
    type Output = Macros;

    fn add(self, rhs: Macros) -> Macros {
        Macros {
            calories: self.calories + rhs.calories,
            protein: self.protein + rhs.protein,
            carbohydrates: self.carbohydrates + rhs.carbohydrates,
            fat: self.fat + rhs.fat,
        }
    }
}

impl AddAssign for Macros {
    fn add_assign(&mut self, rhs: Macros) {
        *self = *self + rhs;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub name: String,
    pub portion_size: String,
    /// `None` when estimation failed for this item.
    pub nutrition: Option<Macros>,
    pub confidence: f64,
}

/// A meal as submitted for saving, before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMeal {
    pub name: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub food_items: Vec<FoodItem>,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl NewMeal {
    pub fn with_id(self, id: String) -> Meal {
        Meal {
            id,
            name: self.name,
            description: self.description,
            date: self.date,
            food_items: self.food_items,
            total_calories: self.total_calories,
            total_protein: self.total_protein,
            total_carbs: self.total_carbs,
            total_fat: self.total_fat,
            image_url: self.image_url,
        }
    }
}

/// Totals are whatever the caller supplied; the store never recomputes them
/// from `food_items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub food_items: Vec<FoodItem>,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Meal {
    pub fn totals(&self) -> Macros {
        Macros {
            calories: self.total_calories,
            protein: self.total_protein,
            carbohydrates: self.total_carbs,
            fat: self.total_fat,
        }
    }
}

/// Derived per-day view, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyNutrition {
    /// `yyyy-MM-dd`
    pub date: String,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub meals: Vec<Meal>,
}

impl DailyNutrition {
    pub fn empty(date: String) -> Self {
        Self {
            date,
            total_calories: 0.0,
            total_protein: 0.0,
            total_carbs: 0.0,
            total_fat: 0.0,
            meals: Vec::new(),
        }
    }

    pub fn push(&mut self, meal: Meal) {
        self.total_calories += meal.total_calories;
        self.total_protein += meal.total_protein;
        self.total_carbs += meal.total_carbs;
        self.total_fat += meal.total_fat;
        self.meals.push(meal);
    }
}

#[cfg(test)]
mod types_tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn macros_tuple_order_is_calories_protein_carbs_fat() {
        let m = Macros {
            calories: 1.0,
            protein: 2.0,
            carbohydrates: 3.0,
            fat: 4.0,
        };
        assert_eq!(m.to_tuple(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(Macros::from_tuple(m.to_tuple()), m);
    }

    #[test]
    fn meal_serializes_with_camel_case_keys() {
        let meal = Meal {
            id: "abc".into(),
            name: "Toast".into(),
            description: String::new(),
            date: datetime!(2024-01-02 08:30:00 UTC),
            food_items: vec![],
            total_calories: 120.0,
            total_protein: 4.0,
            total_carbs: 20.0,
            total_fat: 2.0,
            image_url: None,
        };
        let json = serde_json::to_value(&meal).unwrap();
        assert_eq!(json["totalCalories"], 120.0);
        assert_eq!(json["date"], "2024-01-02T08:30:00Z");
        assert!(json.get("imageUrl").is_none());
    }

    #[test]
    fn daily_nutrition_push_accumulates() {
        let mut day = DailyNutrition::empty("2024-01-02".into());
        let meal = NewMeal {
            name: "Soup".into(),
            description: String::new(),
            date: datetime!(2024-01-02 12:00:00 UTC),
            food_items: vec![],
            total_calories: 200.0,
            total_protein: 10.0,
            total_carbs: 15.0,
            total_fat: 5.0,
            image_url: None,
        }
        .with_id("1".into());
        day.push(meal.clone());
        day.push(meal);
        assert_eq!(day.total_calories, 400.0);
        assert_eq!(day.total_fat, 10.0);
        assert_eq!(day.meals.len(), 2);
    }
}
