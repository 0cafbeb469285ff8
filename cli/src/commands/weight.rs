use std::path::Path;

use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fitzy_core::{JournalService, WeightEntry};

use super::helpers::{LBS_PER_KG, parse_day, print_json, weight_in_kg};

pub(crate) fn cmd_weight_log(
    journal: &mut JournalService,
    value: f64,
    unit: &str,
    date: Option<&str>,
    note: Option<String>,
    photo: Option<&Path>,
    json: bool,
) -> Result<()> {
    let weight_kg = weight_in_kg(value, unit)?;
    if !unit.eq_ignore_ascii_case("kg") && !json {
        eprintln!("Converting {value:.1} lbs → {weight_kg:.2} kg");
    }

    let day = parse_day(date)?;
    let photo_bytes = match photo {
        Some(path) => Some(
            std::fs::read(path)
                .with_context(|| format!("Failed to read photo {}", path.display()))?,
        ),
        None => None,
    };

    let entry = journal.log_weight(day, weight_kg, photo_bytes.as_deref(), note)?;

    if json {
        print_json(&entry)?;
    } else {
        println!(
            "Logged {:.1} kg ({:.1} lbs) for {}",
            entry.weight_kg,
            entry.weight_kg * LBS_PER_KG,
            entry.day
        );
        print_details(&entry);
    }
    Ok(())
}

pub(crate) fn cmd_weight_show(journal: &JournalService, date: Option<&str>, json: bool) -> Result<()> {
    let day = parse_day(date)?;

    match journal.store().fetch_entry(day) {
        Some(entry) if json => print_json(&entry)?,
        Some(entry) => {
            println!(
                "{}: {:.1} kg ({:.1} lbs)",
                entry.day,
                entry.weight_kg,
                entry.weight_kg * LBS_PER_KG
            );
            print_details(&entry);
        }
        None if json => println!(
            "{}",
            serde_json::json!({ "error": format!("No weight entry for {day}") })
        ),
        None => eprintln!("No weight entry for {day}"),
    }
    Ok(())
}

pub(crate) fn cmd_weight_history(journal: &JournalService, days: u32, json: bool) -> Result<()> {
    let entries = journal.store().fetch_recent_entries(days);

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        eprintln!("No weight entries found. Use `fitzy weight log` to record your weight.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct WeightRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight (kg)")]
        kg: String,
        #[tabled(rename = "Weight (lbs)")]
        lbs: String,
        #[tabled(rename = "Photo")]
        photo: &'static str,
        #[tabled(rename = "Note")]
        note: String,
    }

    let rows: Vec<WeightRow> = entries
        .iter()
        .map(|e| WeightRow {
            date: e.day.to_string(),
            kg: format!("{:.1}", e.weight_kg),
            lbs: format!("{:.1}", e.weight_kg * LBS_PER_KG),
            photo: if e.photo_filename.is_some() { "yes" } else { "" },
            note: e.note.clone().unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_weight_delete(journal: &mut JournalService, date: &str, json: bool) -> Result<()> {
    let day = parse_day(Some(date))?;
    let deleted = journal.delete_entry(day);

    if json {
        println!("{}", serde_json::json!({ "day": day, "deleted": deleted }));
    } else if deleted {
        println!("Deleted weight entry for {day}");
    } else {
        eprintln!("No weight entry for {day}");
    }
    Ok(())
}

fn print_details(entry: &WeightEntry) {
    if let Some(ref n) = entry.note {
        println!("  Note: {n}");
    }
    if let Some(ref p) = entry.photo_filename {
        println!("  Photo: {p}");
    }
}
