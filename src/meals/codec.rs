//! Compact on-disk shape of a [`Meal`].
//!
//! Persisted blob: a JSON array of records with the keys
//!
//! | key    | field                                              |
//! |--------|----------------------------------------------------|
//! | `s`    | schema version (absent means 1)                    |
//! | `i`    | id                                                 |
//! | `n`    | name                                               |
//! | `d`    | date, RFC 3339                                     |
//! | `desc` | description                                        |
//! | `f`    | food items `{n, p, c, v}`                          |
//! | `t`    | meal totals                                        |
//! | `u`    | image url, omitted when none                       |
//!
//! Every macro tuple (`v` and `t`) is `[calories, protein, carbohydrates, fat]`.
//! `v` is `null` for an item whose nutrition is unknown. Tuples are fixed
//! length, so a short or long tuple fails decoding instead of yielding holes.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use super::repo_types::{FoodItem, Macros, Meal};

pub const SCHEMA_VERSION: u32 = 1;

fn legacy_version() -> u32 {
    1
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed meal blob: {0}")]
    Json(#[from] serde_json::Error),
    #[error("meal record `{id}` has unsupported schema version {found}")]
    UnsupportedVersion { id: String, found: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactFoodItem {
    pub n: String,
    pub p: String,
    pub c: f64,
    pub v: Option<[f64; 4]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactMeal {
    #[serde(default = "legacy_version")]
    pub s: u32,
    pub i: String,
    pub n: String,
    #[serde(with = "time::serde::rfc3339")]
    pub d: OffsetDateTime,
    pub desc: String,
    pub f: Vec<CompactFoodItem>,
    pub t: [f64; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u: Option<String>,
}

pub fn compress(meal: &Meal) -> CompactMeal {
    CompactMeal {
        s: SCHEMA_VERSION,
        i: meal.id.clone(),
        n: meal.name.clone(),
        d: meal.date,
        desc: meal.description.clone(),
        f: meal
            .food_items
            .iter()
            .map(|item| CompactFoodItem {
                n: item.name.clone(),
                p: item.portion_size.clone(),
                c: item.confidence,
                v: item.nutrition.map(Macros::to_tuple),
            })
            .collect(),
        t: meal.totals().to_tuple(),
        u: meal.image_url.clone(),
    }
}

pub fn decompress(compact: CompactMeal) -> Result<Meal, CodecError> {
    if compact.s != SCHEMA_VERSION {
        return Err(CodecError::UnsupportedVersion {
            id: compact.i,
            found: compact.s,
        });
    }
    let [total_calories, total_protein, total_carbs, total_fat] = compact.t;
    Ok(Meal {
        id: compact.i,
        name: compact.n,
        description: compact.desc,
        date: compact.d,
        food_items: compact
            .f
            .into_iter()
            .map(|item| FoodItem {
                name: item.n,
                portion_size: item.p,
                nutrition: item.v.map(Macros::from_tuple),
                confidence: item.c,
            })
            .collect(),
        total_calories,
        total_protein,
        total_carbs,
        total_fat,
        image_url: compact.u,
    })
}

/// Serializes meals in the given order.
pub fn encode_blob(meals: &[Meal]) -> Result<String, serde_json::Error> {
    let compact: Vec<CompactMeal> = meals.iter().map(compress).collect();
    serde_json::to_string(&compact)
}

/// Fails on the first bad record; callers treat any failure as "no history".
pub fn decode_blob(blob: &str) -> Result<Vec<Meal>, CodecError> {
    let compact: Vec<CompactMeal> = serde_json::from_str(blob)?;
    compact.into_iter().map(decompress).collect()
}

#[cfg(test)]
mod codec_tests {
    use super::*;
    use time::macros::datetime;

    fn sample_meal() -> Meal {
        Meal {
            id: "7f0c".into(),
            name: "Rice + Chicken".into(),
            description: "lunch at the office".into(),
            date: datetime!(2024-03-05 12:15:30.25 +01:00),
            food_items: vec![
                FoodItem {
                    name: "Rice".into(),
                    portion_size: "1 cup".into(),
                    nutrition: Some(Macros {
                        calories: 206.0,
                        protein: 4.3,
                        carbohydrates: 45.0,
                        fat: 0.4,
                    }),
                    confidence: 0.9,
                },
                FoodItem {
                    name: "Mystery sauce".into(),
                    portion_size: "2 tbsp".into(),
                    nutrition: None,
                    confidence: 0.0,
                },
            ],
            total_calories: 206.0,
            total_protein: 4.3,
            total_carbs: 45.0,
            total_fat: 0.4,
            image_url: Some("data:image/jpeg;base64,AAAA".into()),
        }
    }

    #[test]
    fn compress_uses_short_keys_and_ordered_tuples() {
        let json = serde_json::to_value(compress(&sample_meal())).unwrap();
        assert_eq!(json["s"], 1);
        assert_eq!(json["i"], "7f0c");
        assert_eq!(json["desc"], "lunch at the office");
        assert_eq!(json["f"][0]["v"], serde_json::json!([206.0, 4.3, 45.0, 0.4]));
        assert!(json["f"][1]["v"].is_null());
        assert_eq!(json["t"], serde_json::json!([206.0, 4.3, 45.0, 0.4]));
        assert_eq!(json["u"], "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn blob_decodes_to_identical_meals() {
        let mut plain = sample_meal();
        plain.image_url = None;
        plain.id = "other".into();
        let meals = vec![sample_meal(), plain];
        let blob = encode_blob(&meals).unwrap();
        assert!(!blob.contains("\"u\":null"));
        assert_eq!(decode_blob(&blob).unwrap(), meals);
    }

    #[test]
    fn records_without_version_are_read_as_v1() {
        let blob = r#"[{"i":"a","n":"Egg","d":"2024-01-01T07:00:00Z","desc":"",
            "f":[{"n":"Egg","p":"1 large","c":0.8,"v":[78,6,0.6,5]}],"t":[78,6,0.6,5]}]"#;
        let meals = decode_blob(blob).unwrap();
        assert_eq!(meals[0].total_calories, 78.0);
        assert_eq!(meals[0].food_items[0].nutrition.unwrap().fat, 5.0);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut c = compress(&sample_meal());
        c.s = 2;
        let blob = serde_json::to_string(&vec![c]).unwrap();
        assert!(matches!(
            decode_blob(&blob),
            Err(CodecError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn short_tuple_is_a_decode_error() {
        let blob = r#"[{"i":"a","n":"Egg","d":"2024-01-01T07:00:00Z","desc":"","f":[],"t":[78,6]}]"#;
        assert!(matches!(decode_blob(blob), Err(CodecError::Json(_))));
    }
}
