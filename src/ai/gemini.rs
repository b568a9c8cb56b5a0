use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::validate;
use super::{AnalysisError, DetectedFood, FoodAnalyzer, NutritionEstimate};
use crate::config::GeminiConfig;
use crate::meals::repo_types::Macros;

const IDENTIFY_PROMPT: &str = "You identify food in photos. List every distinct food item \
visible in the image with an estimated portion size (for example \"1 cup\", \"1 slice\", \"100g\"). \
Answer with JSON only: {\"foodItems\": [{\"name\": string, \"portionSize\": string}]}. \
Use an empty list when no food is visible.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Food analysis through the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiAnalyzer {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiAnalyzer {
    pub fn new(config: GeminiConfig) -> Result<Self, AnalysisError> {
        if config.api_key.trim().is_empty() {
            return Err(AnalysisError::Config("Gemini API key is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn generate(&self, parts: Vec<Part>) -> Result<serde_json::Value, AnalysisError> {
        let request = GenerateContentRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(format!("generateContent response: {e}")))?;
        let text = response_text(&body)?;
        debug!(chars = text.len(), "gemini responded");
        validate::extract_json(&text)
    }
}

fn response_text(body: &GenerateContentResponse) -> Result<String, AnalysisError> {
    let text: String = body
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(AnalysisError::Parse("no text in model response".into()));
    }
    Ok(text)
}

fn mime_from_url(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// `data:<mime>;base64,<payload>` becomes inline data; http(s) URLs are passed by reference.
fn image_part(photo_url: &str) -> Result<Part, AnalysisError> {
    if let Some(rest) = photo_url.strip_prefix("data:") {
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| AnalysisError::Invalid("data URL without payload".into()))?;
        let mime_type = header
            .strip_suffix(";base64")
            .filter(|m| m.starts_with("image/"))
            .ok_or_else(|| AnalysisError::Invalid(format!("unsupported data URL header `{header}`")))?;
        return Ok(Part {
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: payload.to_string(),
            }),
            ..Default::default()
        });
    }

    if photo_url.starts_with("https://") || photo_url.starts_with("http://") {
        return Ok(Part {
            file_data: Some(FileData {
                mime_type: mime_from_url(photo_url).unwrap_or("image/jpeg").to_string(),
                file_uri: photo_url.to_string(),
            }),
            ..Default::default()
        });
    }

    Err(AnalysisError::Invalid("photo must be a data: or http(s) URL".into()))
}

fn analyze_prompt(food_name: &str, portion_size: &str) -> String {
    format!(
        "You are a nutritionist. Estimate the nutrition of this food for the given portion, \
considering typical preparation and ingredients. Calories must agree with the macros \
(4 kcal per gram of protein or carbohydrate, 9 per gram of fat).\n\
Food item: {food_name}\nPortion size: {portion_size}\n\
Answer with JSON only: {{\"calories\": number, \"protein\": number, \"carbohydrates\": number, \
\"fat\": number, \"confidence\": number between 0 and 1}}"
    )
}

fn refine_prompt(food_name: &str, raw: Macros) -> String {
    format!(
        "You are a nutritionist. These values for a food item come from a product database \
and may be off. Adjust them toward the normal range for this food without drastic changes. \
Unusually high calories may mean fried or energy-dense food; unusually low calories may mean \
a misidentified item.\n\
Food item: {food_name}\nCalories: {}\nProtein: {}\nCarbohydrates: {}\nFat: {}\n\
Answer with JSON only: {{\"refinedCalories\": number, \"refinedProtein\": number, \
\"refinedCarbohydrates\": number, \"refinedFat\": number}}",
        raw.calories, raw.protein, raw.carbohydrates, raw.fat
    )
}

fn alternatives_prompt(food_name: &str, nutrition: Macros) -> String {
    format!(
        "Suggest healthier alternatives to {food_name} with a similar taste profile.\n\
Its nutrition: calories {}, protein {}, carbohydrates {}, fat {}.\n\
Answer with JSON only: {{\"alternatives\": [string]}}",
        nutrition.calories, nutrition.protein, nutrition.carbohydrates, nutrition.fat
    )
}

#[async_trait]
impl FoodAnalyzer for GeminiAnalyzer {
    #[instrument(skip(self, photo_url))]
    async fn identify_food_from_image(
        &self,
        photo_url: &str,
    ) -> Result<Vec<DetectedFood>, AnalysisError> {
        let parts = vec![Part::text(IDENTIFY_PROMPT), image_part(photo_url)?];
        let value = self.generate(parts).await?;
        validate::detected_foods(&value)
    }

    #[instrument(skip(self))]
    async fn analyze_nutrition(
        &self,
        food_name: &str,
        portion_size: &str,
    ) -> Result<NutritionEstimate, AnalysisError> {
        let value = self
            .generate(vec![Part::text(analyze_prompt(food_name, portion_size))])
            .await?;
        validate::nutrition_estimate(&value)
    }

    #[instrument(skip(self))]
    async fn refine_nutrition_data(
        &self,
        food_name: &str,
        raw: Macros,
    ) -> Result<Macros, AnalysisError> {
        let value = self
            .generate(vec![Part::text(refine_prompt(food_name, raw))])
            .await?;
        validate::refined_macros(&value)
    }

    #[instrument(skip(self))]
    async fn suggest_healthy_alternatives(
        &self,
        food_name: &str,
        nutrition: Macros,
    ) -> Result<Vec<String>, AnalysisError> {
        let value = self
            .generate(vec![Part::text(alternatives_prompt(food_name, nutrition))])
            .await?;
        validate::alternatives(&value)
    }
}
