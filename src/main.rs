use anyhow::Context;
use serde_json::json;
use time::macros::format_description;
use time::{Date, Duration};

use mealmind_local::meals::store::day_bounds;
use mealmind_local::report::daily_chart;
use mealmind_local::state::AppState;
use mealmind_local::telemetry;

const SUMMARY_DAYS: i64 = 7;

fn parse_day(raw: &str) -> anyhow::Result<Date> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("expected YYYY-MM-DD, got {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let state = AppState::init().await?;

    let day = match std::env::args().nth(1) {
        Some(raw) => parse_day(&raw)?,
        None => state.activity.today(),
    };
    tracing::info!(%day, "building report");

    let offset = state.config.local_offset;
    let (week_start, _) = day_bounds(day - Duration::days(SUMMARY_DAYS - 1), offset);
    let (_, week_end) = day_bounds(day, offset);

    let daily = state.nutrition.get_daily_nutrition(day).await;
    let summary = state
        .nutrition
        .get_nutrition_summary(week_start, week_end)
        .await;
    let chart = daily_chart(&state.meals, day, SUMMARY_DAYS as u16).await;
    let activity = state.activity.activity_for(day).await;

    let report = json!({
        "daily": daily,
        "summary": summary,
        "chart": chart,
        "activity": activity,
        "waterProgress": state.activity.water_progress(day).await,
        "stepsProgress": state.activity.steps_progress(day).await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
