use std::path::Path;

use anyhow::{Context, Result, bail};

use fitzy_core::JournalService;

use super::helpers::parse_day;

pub(crate) fn cmd_photo_export(
    journal: &JournalService,
    date: &str,
    out: &Path,
    thumbnail: bool,
    json: bool,
) -> Result<()> {
    let day = parse_day(Some(date))?;
    let Some(bytes) = journal.load_photo(day, thumbnail) else {
        bail!("No photo for {day}");
    };
    std::fs::write(out, &bytes).with_context(|| format!("Failed to write {}", out.display()))?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "day": day, "path": out, "bytes": bytes.len() })
        );
    } else {
        println!("Wrote {} ({} bytes)", out.display(), bytes.len());
    }
    Ok(())
}

pub(crate) fn cmd_photo_dir(journal: &JournalService, json: bool) -> Result<()> {
    let dir = journal.photos_directory()?;
    if json {
        println!("{}", serde_json::json!({ "path": dir }));
    } else {
        println!("{}", dir.display());
    }
    Ok(())
}
