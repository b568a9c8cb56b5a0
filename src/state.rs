use std::sync::Arc;

use anyhow::Context;
use time::UtcOffset;
use tracing::{info, warn};

use crate::activity::ActivityStore;
use crate::ai::{FoodAnalyzer, GeminiAnalyzer};
use crate::config::{
    ActivityGoals, AppConfig, RetentionPolicy, StorageConfig, DEFAULT_OPENFOODFACTS_URL,
};
use crate::lookup::{NutritionLookup, OpenFoodFactsClient};
use crate::meals::{MealStore, NutritionAggregator};
use crate::storage::{LocalStorage, MemoryStorage, SqliteStorage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn LocalStorage>,
    pub meals: MealStore,
    pub nutrition: NutritionAggregator,
    pub activity: ActivityStore,
    pub lookup: Arc<dyn NutritionLookup>,
    /// `None` when no Gemini key is configured.
    pub analyzer: Option<Arc<dyn FoodAnalyzer>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let storage = Arc::new(
            SqliteStorage::connect(&config.storage.url, config.storage.quota_bytes)
                .await
                .with_context(|| format!("opening storage at {}", config.storage.url))?,
        ) as Arc<dyn LocalStorage>;

        let lookup = Arc::new(OpenFoodFactsClient::new(
            config.openfoodfacts_base_url.clone(),
        )?) as Arc<dyn NutritionLookup>;

        let analyzer = match &config.gemini {
            Some(gemini) => {
                Some(Arc::new(GeminiAnalyzer::new(gemini.clone())?) as Arc<dyn FoodAnalyzer>)
            }
            None => {
                warn!("GEMINI_API_KEY not set; photo analysis disabled");
                None
            }
        };

        info!(storage = %config.storage.url, "state initialised");
        Ok(Self::from_parts(config, storage, lookup, analyzer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        storage: Arc<dyn LocalStorage>,
        lookup: Arc<dyn NutritionLookup>,
        analyzer: Option<Arc<dyn FoodAnalyzer>>,
    ) -> Self {
        let meals = MealStore::new(storage.clone(), config.retention, config.local_offset);
        let activity = ActivityStore::new(storage.clone(), config.goals, config.local_offset);
        Self {
            nutrition: NutritionAggregator::new(meals.clone()),
            meals,
            activity,
            config,
            storage,
            lookup,
            analyzer,
        }
    }

    /// In-memory storage, no analyzer, and a lookup that never hits the network.
    pub fn fake() -> Self {
        use async_trait::async_trait;

        use crate::meals::Macros;

        struct FakeLookup;
        #[async_trait]
        impl NutritionLookup for FakeLookup {
            async fn get_nutrition(&self, _food_name: &str) -> Macros {
                Macros::ZERO
            }
        }

        let config = Arc::new(AppConfig {
            storage: StorageConfig {
                url: "memory".into(),
                quota_bytes: None,
            },
            retention: RetentionPolicy::default(),
            local_offset: UtcOffset::UTC,
            openfoodfacts_base_url: DEFAULT_OPENFOODFACTS_URL.into(),
            gemini: None,
            goals: ActivityGoals::default(),
        });

        let storage = Arc::new(MemoryStorage::new()) as Arc<dyn LocalStorage>;
        Self::from_parts(config, storage, Arc::new(FakeLookup), None)
    }
}
