use std::str::FromStr;

use anyhow::Context;
use time::UtcOffset;

/// How many meals the store keeps and how hard it tries when storage is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_retained: usize,
    pub min_retained: usize,
    pub max_retries: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_retained: 50,
            min_retained: 10,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
    pub quota_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityGoals {
    pub water_ml: u32,
    pub steps: u32,
}

impl Default for ActivityGoals {
    fn default() -> Self {
        Self {
            water_ml: 2500,
            steps: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub retention: RetentionPolicy,
    pub local_offset: UtcOffset,
    pub openfoodfacts_base_url: String,
    pub gemini: Option<GeminiConfig>,
    pub goals: ActivityGoals,
}

pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_OPENFOODFACTS_URL: &str = "https://world.openfoodfacts.org";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let retention = RetentionPolicy {
            max_retained: env_parse("MEALS_MAX_RETAINED", 50)?,
            min_retained: env_parse("MEALS_MIN_RETAINED", 10)?,
            max_retries: env_parse("MEALS_MAX_RETRIES", 3)?,
        };
        anyhow::ensure!(
            retention.min_retained <= retention.max_retained,
            "MEALS_MIN_RETAINED ({}) must not exceed MEALS_MAX_RETAINED ({})",
            retention.min_retained,
            retention.max_retained
        );

        let quota: u64 = env_parse("STORAGE_QUOTA_BYTES", DEFAULT_QUOTA_BYTES)?;
        let storage = StorageConfig {
            url: std::env::var("STORAGE_URL")
                .unwrap_or_else(|_| "sqlite://mealmind.db?mode=rwc".into()),
            // 0 disables the quota
            quota_bytes: (quota > 0).then_some(quota),
        };

        let offset_minutes: i32 = env_parse("LOCAL_UTC_OFFSET_MINUTES", 0)?;
        let local_offset = UtcOffset::from_whole_seconds(offset_minutes * 60)
            .with_context(|| format!("LOCAL_UTC_OFFSET_MINUTES out of range: {offset_minutes}"))?;

        let gemini = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|api_key| GeminiConfig {
                api_key,
                model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".into()),
                base_url: std::env::var("GEMINI_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_GEMINI_URL.into()),
            });

        Ok(Self {
            storage,
            retention,
            local_offset,
            openfoodfacts_base_url: std::env::var("OPENFOODFACTS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENFOODFACTS_URL.into()),
            gemini,
            goals: ActivityGoals {
                water_ml: env_parse("WATER_GOAL_ML", 2500)?,
                steps: env_parse("STEPS_GOAL", 10_000)?,
            },
        })
    }
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {name}={raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}
