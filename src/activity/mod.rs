pub mod store;

use serde::{Deserialize, Serialize};

pub use store::ActivityStore;

/// Rough burn rate used for the daily estimate.
pub const CALORIES_PER_STEP: f64 = 0.04;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityData {
    /// `yyyy-MM-dd`
    pub date: String,
    pub steps: u32,
    /// Millilitres.
    pub water_intake: u32,
    pub calories_burned: u32,
}

impl ActivityData {
    pub fn empty(date: String) -> Self {
        Self {
            date,
            steps: 0,
            water_intake: 0,
            calories_burned: 0,
        }
    }
}

pub fn calories_for_steps(steps: u32) -> u32 {
    (f64::from(steps) * CALORIES_PER_STEP).floor() as u32
}
