pub mod activity;
pub mod ai;
pub mod config;
pub mod lookup;
pub mod meals;
pub mod report;
pub mod state;
pub mod storage;
pub mod telemetry;
