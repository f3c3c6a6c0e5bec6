//! Command registry and routing
//!
//! The registry is an explicit object built once at startup and passed by
//! reference to the dispatcher - no process-wide command table. Each entry
//! is a small value implementing the common [`Command`] capability, looked
//! up by name. Script-backed commands validate their arguments before any
//! subprocess is launched; native commands answer from the record store
//! directly.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use musiclib_common::conf::ShellConfig;
use musiclib_common::events::EventBus;
use musiclib_common::script::ScriptRunner;

mod library;
mod scripts;

/// Shared state handed to every command execution
pub struct CliContext {
    pub events: EventBus,
    pub runner: ScriptRunner,
    pub config: ShellConfig,
}

impl CliContext {
    pub fn new() -> Self {
        let events = EventBus::default();
        Self {
            runner: ScriptRunner::new(events.clone()),
            config: ShellConfig::load_or_default(),
            events,
        }
    }

    /// Path of musiclib.dsv: the DB_FILE config key, defaulting to
    /// ~/musiclib/musiclib.dsv
    pub fn database_path(&self) -> PathBuf {
        self.config.path_value("DB_FILE").unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("musiclib")
                .join("musiclib.dsv")
        })
    }
}

/// A dispatchable subcommand
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-line description for the command listing
    fn description(&self) -> &'static str;

    /// Argument synopsis shown after the command name
    fn usage(&self) -> &'static str;

    /// Extra help shown below the usage line
    fn help_detail(&self) -> &'static str {
        ""
    }

    /// Validate arguments and run; returns the process exit code
    async fn execute(&self, ctx: &CliContext, args: &[String]) -> Result<i32>;
}

/// Name-addressed command table
pub struct CommandRegistry {
    commands: Vec<Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: vec![
                Box::new(scripts::RateCommand),
                Box::new(scripts::MobileCommand),
                Box::new(scripts::BuildCommand),
                Box::new(scripts::TagCleanCommand),
                Box::new(scripts::TagRebuildCommand),
                Box::new(scripts::NewTracksCommand),
                Box::new(scripts::ProcessPendingCommand),
                Box::new(scripts::SetupCommand),
                Box::new(library::TracksCommand),
                Box::new(library::WatchCommand),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands
            .iter()
            .find(|c| c.name() == name)
            .map(Box::as_ref)
    }

    /// Print the "  name  description" listing, one command per line
    pub fn print_listing(&self) {
        for command in &self.commands {
            println!("  {:<18}{}", command.name(), command.description());
        }
    }

    /// Print full help for one command
    pub fn print_help(&self, name: &str) {
        let Some(command) = self.get(name) else {
            eprintln!("Error: Unknown command '{name}'");
            return;
        };
        println!("Usage: musiclib-cli {} {}", command.name(), command.usage());
        println!();
        println!("{}", command.description());
        let detail = command.help_detail();
        if !detail.is_empty() {
            println!();
            println!("{detail}");
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
