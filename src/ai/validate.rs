//! Turns raw model output into domain values.
//!
//! Model responses are untrusted: they may arrive wrapped in markdown fences,
//! with numbers as strings ("120 kcal"), negative grams or confidences outside
//! `[0, 1]`. Everything goes through here before a domain type is built.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::{AnalysisError, DetectedFood, NutritionEstimate};
use crate::meals::repo_types::Macros;

const DEFAULT_PORTION: &str = "1 serving";

lazy_static! {
    static ref FENCED: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap();
    static ref LEADING_NUMBER: Regex = Regex::new(r"^\s*(-?\d+(?:\.\d+)?)").unwrap();
}

pub fn extract_json(text: &str) -> Result<Value, AnalysisError> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }
    if let Some(inner) = FENCED.captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(v) = serde_json::from_str::<Value>(inner.as_str()) {
            return Ok(v);
        }
    }
    // prose around a bare object or array
    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    if let (Some(s), Some(e)) = (start, end) {
        if s < e {
            if let Ok(v) = serde_json::from_str::<Value>(&trimmed[s..=e]) {
                return Ok(v);
            }
        }
    }
    Err(AnalysisError::Parse(truncate(trimmed, 120)))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}

fn number(obj: &Value, field: &str) -> Result<f64, AnalysisError> {
    let parsed = match obj.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => LEADING_NUMBER
            .captures(s)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok()),
        Some(_) | None => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(AnalysisError::Invalid(format!("`{field}` is not finite: {v}"))),
        None => Err(AnalysisError::Invalid(format!("`{field}` missing or not a number"))),
    }
}

/// Reads four macro fields (calories, protein, carbohydrates, fat order).
/// Negative amounts are clamped to 0.
pub fn macros_from(obj: &Value, fields: [&str; 4]) -> Result<Macros, AnalysisError> {
    if !obj.is_object() {
        return Err(AnalysisError::Invalid("expected a JSON object".into()));
    }
    let mut tuple = [0.0; 4];
    for (slot, field) in tuple.iter_mut().zip(fields) {
        *slot = number(obj, field)?.max(0.0);
    }
    Ok(Macros::from_tuple(tuple))
}

pub fn clamp_confidence(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn nutrition_estimate(value: &Value) -> Result<NutritionEstimate, AnalysisError> {
    let macros = macros_from(value, ["calories", "protein", "carbohydrates", "fat"])?;
    let confidence = number(value, "confidence").map(clamp_confidence).unwrap_or(0.0);
    Ok(NutritionEstimate { macros, confidence })
}

pub fn refined_macros(value: &Value) -> Result<Macros, AnalysisError> {
    macros_from(
        value,
        ["refinedCalories", "refinedProtein", "refinedCarbohydrates", "refinedFat"],
    )
}

/// Accepts either a bare array or `{"foodItems": [...]}`. Entries without a
/// usable name are dropped; a missing portion becomes "1 serving".
pub fn detected_foods(value: &Value) -> Result<Vec<DetectedFood>, AnalysisError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("foodItems") {
            Some(Value::Array(items)) => items,
            _ => return Err(AnalysisError::Invalid("`foodItems` array missing".into())),
        },
        _ => return Err(AnalysisError::Invalid("expected food item list".into())),
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let portion = item
                .get("portionSize")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .unwrap_or(DEFAULT_PORTION);
            Some(DetectedFood {
                name: name.to_string(),
                portion_size: portion.to_string(),
            })
        })
        .collect())
}

/// Accepts a bare array or `{"alternatives": [...]}`; blank and repeated entries are dropped.
pub fn alternatives(value: &Value) -> Result<Vec<String>, AnalysisError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("alternatives") {
            Some(Value::Array(items)) => items,
            _ => return Err(AnalysisError::Invalid("`alternatives` array missing".into())),
        },
        _ => return Err(AnalysisError::Invalid("expected alternatives list".into())),
    };
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for s in items.iter().filter_map(Value::as_str).map(str::trim) {
        if !s.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(s)) {
            out.push(s.to_string());
        }
    }
    Ok(out)
}
