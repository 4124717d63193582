//! hamster CLI: the `hamster` command.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use hamster_core::{default_log_level, init_logging, TrackingSettings};
use log::{info, warn};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or_else(|| default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("hamster: {err}");
            return ExitCode::FAILURE;
        }
    }

    let settings = match &cli.settings {
        Some(path) => match TrackingSettings::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                eprintln!("hamster: cannot load `{}`: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => TrackingSettings::default(),
    };

    let command = cli.command.name();
    info!("event=cli_command module=cli status=start command={command}");

    let result = match cli.command {
        Commands::Parse { line, json } => commands::parse(&settings, &line.join(" "), json),
        Commands::Add { line, temporary } => {
            commands::add(&cli.db, &settings, &line.join(" "), temporary)
        }
        Commands::Stop { at } => commands::stop(&cli.db, &settings, at.as_deref()),
        Commands::Today { search, json } => commands::today(&cli.db, &settings, &search, json),
        Commands::Remove { id } => commands::remove(&cli.db, &settings, id),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            warn!("event=cli_command module=cli status=error command={command}");
            eprintln!("hamster: {message}");
            ExitCode::FAILURE
        }
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Add { .. } => "add",
            Self::Stop { .. } => "stop",
            Self::Today { .. } => "today",
            Self::Remove { .. } => "remove",
        }
    }
}
