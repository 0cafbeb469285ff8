use anyhow::Result;
use serde::Serialize;

use fitzy_core::{JournalService, Projection};

use super::helpers::{LBS_PER_KG, no_neg_zero};

#[derive(Serialize)]
struct Dashboard<'a> {
    #[serde(flatten)]
    projection: &'a Projection,
    latest_weight_kg: Option<f64>,
    to_target_kg: Option<f64>,
}

impl<'a> Dashboard<'a> {
    fn new(projection: &'a Projection) -> Self {
        let latest_weight_kg = projection.recent_entries.last().map(|e| e.weight_kg);
        let to_target_kg = match (&projection.profile, latest_weight_kg) {
            (Some(profile), Some(latest)) => Some(no_neg_zero(latest - profile.target_weight_kg)),
            _ => None,
        };
        Self {
            projection,
            latest_weight_kg,
            to_target_kg,
        }
    }
}

pub(crate) fn cmd_dashboard(journal: &mut JournalService, json: bool) -> Result<()> {
    let store = journal.store_mut();
    store.get_or_create_profile();
    let dashboard = Dashboard::new(store.projection());

    if json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
        return Ok(());
    }

    if let Some(profile) = &dashboard.projection.profile {
        println!(
            "Profile: {:.1} cm, target {:.1} kg",
            profile.height_cm, profile.target_weight_kg
        );
    }
    match &dashboard.projection.today_entry {
        Some(e) => println!("Today:   {:.1} kg ({:.1} lbs)", e.weight_kg, e.weight_kg * LBS_PER_KG),
        None => println!("Today:   not logged yet"),
    }
    println!(
        "Entries: {} in the recent window",
        dashboard.projection.recent_entries.len()
    );
    if let (Some(latest), Some(diff)) = (dashboard.latest_weight_kg, dashboard.to_target_kg) {
        println!("Latest:  {latest:.1} kg, {diff:+.1} kg from target");
    }
    Ok(())
}
