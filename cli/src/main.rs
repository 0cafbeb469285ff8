mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    cmd_dashboard, cmd_photo_dir, cmd_photo_export, cmd_profile_set, cmd_profile_show,
    cmd_weight_delete, cmd_weight_history, cmd_weight_log, cmd_weight_show, json_error,
};
use crate::config::Config;
use fitzy_core::{JournalService, LoadPolicy, StoreStatus};

#[derive(Parser)]
#[command(
    name = "fitzy",
    version,
    about = "A local-first weight journal with progress photos"
)]
struct Cli {
    /// Use a throwaway in-memory store
    #[arg(long, global = true)]
    in_memory: bool,
    /// What to do if the store cannot be opened: abort or degrade
    #[arg(long, global = true, value_name = "POLICY")]
    load_policy: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or edit your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Track body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Progress photos
    Photo {
        #[command(subcommand)]
        command: PhotoCommands,
    },
    /// Profile, today's entry and progress toward the target
    Dashboard {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the profile (created with defaults on first use)
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update height and/or target weight
    Set {
        /// Height in centimeters
        #[arg(long)]
        height: Option<f64>,
        /// Target weight in kilograms
        #[arg(long)]
        target: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight for a day (replaces that day's entry)
    Log {
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Note for the day
        #[arg(long)]
        note: Option<String>,
        /// Progress photo to attach (PNG or JPEG)
        #[arg(long, value_name = "PATH")]
        photo: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the entry for a day
    Show {
        /// Date (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show entries for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "90")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the entry for a day, with its photos
    Delete {
        /// Date (YYYY-MM-DD)
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PhotoCommands {
    /// Copy a day's photo to a file
    Export {
        /// Date (YYYY-MM-DD)
        date: String,
        /// Output file
        out: PathBuf,
        /// Export the thumbnail instead of the full image
        #[arg(long)]
        thumbnail: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the photo directory
    Dir {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Commands::Dashboard { json } => *json,
            Commands::Profile { command } => match command {
                ProfileCommands::Show { json } | ProfileCommands::Set { json, .. } => *json,
            },
            Commands::Weight { command } => match command {
                WeightCommands::Log { json, .. }
                | WeightCommands::Show { json, .. }
                | WeightCommands::History { json, .. }
                | WeightCommands::Delete { json, .. } => *json,
            },
            Commands::Photo { command } => match command {
                PhotoCommands::Export { json, .. } | PhotoCommands::Dir { json } => *json,
            },
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let json = cli.command.wants_json();

    if let Err(e) = run(cli) {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let load_policy = cli
        .load_policy
        .as_deref()
        .map(str::parse::<LoadPolicy>)
        .transpose()?;
    let config = Config::load(load_policy)?;
    let mut journal = JournalService::open(&config.store_config(cli.in_memory), &config.photos_dir)?;

    if journal.store().status() == StoreStatus::Degraded {
        tracing::warn!(
            path = %config.db_path.display(),
            "Store could not be opened; changes will not be saved"
        );
    }

    match cli.command {
        Commands::Profile { command } => match command {
            ProfileCommands::Show { json } => cmd_profile_show(&mut journal, json),
            ProfileCommands::Set {
                height,
                target,
                json,
            } => cmd_profile_set(&mut journal, height, target, json),
        },
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                note,
                photo,
                json,
            } => cmd_weight_log(
                &mut journal,
                value,
                &unit,
                date.as_deref(),
                note,
                photo.as_deref(),
                json,
            ),
            WeightCommands::Show { date, json } => cmd_weight_show(&journal, date.as_deref(), json),
            WeightCommands::History { days, json } => cmd_weight_history(&journal, days, json),
            WeightCommands::Delete { date, json } => cmd_weight_delete(&mut journal, &date, json),
        },
        Commands::Photo { command } => match command {
            PhotoCommands::Export {
                date,
                out,
                thumbnail,
                json,
            } => cmd_photo_export(&journal, &date, &out, thumbnail, json),
            PhotoCommands::Dir { json } => cmd_photo_dir(&journal, json),
        },
        Commands::Dashboard { json } => cmd_dashboard(&mut journal, json),
    }
}
