use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use fitzy_core::DayKey;
use fitzy_core::models::validate_weight_kg;

pub(crate) const LBS_PER_KG: f64 = 2.20462;
const KG_PER_LB: f64 = 0.453_592;

pub(crate) fn parse_day(date_str: Option<&str>) -> Result<DayKey> {
    let today = Local::now().date_naive();
    let date = match date_str {
        None | Some("today") => today,
        Some("yesterday") => today - chrono::Duration::days(1),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD, today or yesterday"))?,
    };
    Ok(DayKey::from(date))
}

/// Converts a user-entered weight to kilograms.
pub(crate) fn weight_in_kg(value: f64, unit: &str) -> Result<f64> {
    let kg = match unit.to_lowercase().as_str() {
        "kg" => value,
        "lbs" | "lb" => no_neg_zero(value * KG_PER_LB),
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    };
    validate_weight_kg(kg)?;
    Ok(kg)
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}
