pub mod codec;
pub mod nutrition;
pub mod repo_types;
pub mod services;
pub mod store;

pub use nutrition::NutritionAggregator;
pub use repo_types::{DailyNutrition, FoodItem, Macros, Meal, NewMeal};
pub use store::{MealStore, MealStoreError};
