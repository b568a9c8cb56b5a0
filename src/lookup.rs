use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::meals::repo_types::Macros;

/// Food-database lookup by name. Never fails: anything that goes wrong
/// degrades to zero macros.
#[async_trait]
pub trait NutritionLookup: Send + Sync {
    async fn get_nutrition(&self, food_name: &str) -> Macros;
}

/// Open Food Facts product search, values per 100 g.
#[derive(Clone)]
pub struct OpenFoodFactsClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    #[serde(default)]
    nutriments: serde_json::Map<String, Value>,
}

impl OpenFoodFactsClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("mealmind-local/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn search(&self, food_name: &str) -> anyhow::Result<Option<Macros>> {
        let url = format!("{}/cgi/search.pl", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("search_terms", food_name),
                ("fields", "product_name,nutriments"),
                ("json", "1"),
                ("page_size", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("open food facts returned HTTP {status}");
        }

        let body: SearchResponse = response.json().await?;
        Ok(first_product_macros(body))
    }
}

fn first_product_macros(body: SearchResponse) -> Option<Macros> {
    let product = body.products.into_iter().next()?;
    let n = &product.nutriments;
    Some(Macros {
        calories: nutriment(n, "energy-kcal_100g"),
        protein: nutriment(n, "proteins_100g"),
        carbohydrates: nutriment(n, "carbohydrates_100g"),
        fat: nutriment(n, "fat_100g"),
    })
}

/// Missing or unreadable values count as 0. The API sometimes sends numbers as strings.
fn nutriment(nutriments: &serde_json::Map<String, Value>, key: &str) -> f64 {
    let value = match nutriments.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

#[async_trait]
impl NutritionLookup for OpenFoodFactsClient {
    #[instrument(skip(self))]
    async fn get_nutrition(&self, food_name: &str) -> Macros {
        match self.search(food_name).await {
            Ok(Some(macros)) => macros,
            Ok(None) => {
                warn!(food_name, "no food data found in open food facts");
                Macros::ZERO
            }
            Err(e) => {
                warn!(error = %e, food_name, "failed to fetch nutrition from open food facts");
                Macros::ZERO
            }
        }
    }
}
