use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::meals::repo_types::Macros;

pub mod gemini;
pub mod validate;

pub use gemini::GeminiAnalyzer;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("unparseable model output: {0}")]
    Parse(String),
    #[error("invalid model output: {0}")]
    Invalid(String),
    #[error("analyzer not configured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        AnalysisError::Request(e.to_string())
    }
}

/// A food item spotted in a photo, before any nutrition is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFood {
    pub name: String,
    pub portion_size: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NutritionEstimate {
    pub macros: Macros,
    /// In `[0, 1]`.
    pub confidence: f64,
}

/// Generative-AI food recognition and nutrition estimation.
///
/// Implementations do not retry. Callers composing several items decide how
/// to handle a failed one.
#[async_trait]
pub trait FoodAnalyzer: Send + Sync {
    /// `photo_url` is an http(s) URL or a `data:` URL. The result may be empty.
    async fn identify_food_from_image(
        &self,
        photo_url: &str,
    ) -> Result<Vec<DetectedFood>, AnalysisError>;

    async fn analyze_nutrition(
        &self,
        food_name: &str,
        portion_size: &str,
    ) -> Result<NutritionEstimate, AnalysisError>;

    /// Nudges database values toward typical ones for `food_name`.
    async fn refine_nutrition_data(
        &self,
        food_name: &str,
        raw: Macros,
    ) -> Result<Macros, AnalysisError>;

    async fn suggest_healthy_alternatives(
        &self,
        food_name: &str,
        nutrition: Macros,
    ) -> Result<Vec<String>, AnalysisError>;
}
