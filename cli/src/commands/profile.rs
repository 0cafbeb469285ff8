use anyhow::{Result, bail};

use fitzy_core::{JournalService, ProfileUpdate, UserProfile};

use super::helpers::print_json;

pub(crate) fn cmd_profile_show(journal: &mut JournalService, json: bool) -> Result<()> {
    let profile = journal.store_mut().get_or_create_profile();
    if json {
        print_json(&profile)
    } else {
        print_profile(&profile);
        Ok(())
    }
}

pub(crate) fn cmd_profile_set(
    journal: &mut JournalService,
    height_cm: Option<f64>,
    target_kg: Option<f64>,
    json: bool,
) -> Result<()> {
    let update = ProfileUpdate {
        height_cm,
        target_weight_kg: target_kg,
    };
    if update.is_empty() {
        bail!("Nothing to update. Pass --height and/or --target");
    }
    for value in [height_cm, target_kg].into_iter().flatten() {
        if !value.is_finite() || value <= 0.0 {
            bail!("Profile values must be positive numbers (got {value})");
        }
    }

    let profile = journal.store_mut().update_profile(update);
    if json {
        print_json(&profile)
    } else {
        println!("Profile updated");
        print_profile(&profile);
        Ok(())
    }
}

fn print_profile(profile: &UserProfile) {
    println!("Height:        {:.1} cm", profile.height_cm);
    println!("Target weight: {:.1} kg", profile.target_weight_kg);
    println!("Since:         {}", profile.created_at.format("%Y-%m-%d"));
}
