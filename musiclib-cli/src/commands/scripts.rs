//! Script-backed subcommands
//!
//! Each command validates its arguments, then hands the launch to the
//! script runner. The scripts own the actual behavior; validation here
//! exists only to fail fast with a usable message before any subprocess
//! starts.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::commands::{CliContext, Command};
use crate::output::run_streaming;

pub struct RateCommand;

#[async_trait]
impl Command for RateCommand {
    fn name(&self) -> &'static str {
        "rate"
    }

    fn description(&self) -> &'static str {
        "Set star rating for a track (0-5 stars)"
    }

    fn usage(&self) -> &'static str {
        "<rating> | <filepath> <rating>"
    }

    fn help_detail(&self) -> &'static str {
        "Arguments:\n  \
         <rating>     Star rating (0-5, where 0 removes rating)\n  \
         <filepath>   Path to audio file (omit to rate the currently playing track)\n\n\
         Examples:\n  \
         musiclib-cli rate 4\n  \
         musiclib-cli rate \"/mnt/music/song.mp3\" 4"
    }

    async fn execute(&self, ctx: &CliContext, args: &[String]) -> Result<i32> {
        let (filepath, rating_text) = match args {
            [rating] => (None, rating),
            [filepath, rating] => (Some(filepath), rating),
            _ => {
                eprintln!("Error: 'rate' requires 1 or 2 arguments");
                return Ok(1);
            }
        };

        if let Some(filepath) = filepath {
            if !Path::new(filepath.as_str()).exists() {
                eprintln!("Error: File not found: {filepath}");
                return Ok(1);
            }
        }

        match rating_text.parse::<i32>() {
            Ok(rating) if (0..=5).contains(&rating) => {}
            _ => {
                eprintln!("Error: Rating must be an integer between 0 and 5");
                return Ok(1);
            }
        }

        // Rating first, then the optional filepath - the script's argument
        // order; with no filepath it rates the currently playing track
        let mut script_args = vec![rating_text.clone()];
        if let Some(filepath) = filepath {
            script_args.push(filepath.clone());
        }
        run_streaming(ctx, "rate", "musiclib_rate.sh", &script_args, None).await
    }
}

pub struct MobileCommand;

const MOBILE_SUBCOMMANDS: [&str; 6] = [
    "upload",
    "refresh-audacious-only",
    "update-lastplayed",
    "status",
    "logs",
    "cleanup",
];

#[async_trait]
impl Command for MobileCommand {
    fn name(&self) -> &'static str {
        "mobile"
    }

    fn description(&self) -> &'static str {
        "Mobile sync and Audacious playlist management"
    }

    fn usage(&self) -> &'static str {
        "upload|refresh-audacious-only|update-lastplayed|status|logs|cleanup [args...]"
    }

    fn help_detail(&self) -> &'static str {
        "Subcommands:\n  \
         upload <playlist> [device-id]  Upload playlist to mobile device\n  \
         refresh-audacious-only         Refresh playlists from Audacious only\n  \
         update-lastplayed <playlist>   Update last-played times for a playlist\n  \
         status                         Show current mobile playlist status\n  \
         logs [filter]                  View mobile operations log\n  \
         cleanup                        Remove orphaned metadata files"
    }

    async fn execute(&self, ctx: &CliContext, args: &[String]) -> Result<i32> {
        let Some(subcommand) = args.first() else {
            eprintln!("Error: 'mobile' requires a subcommand");
            eprintln!("Valid subcommands: {}", MOBILE_SUBCOMMANDS.join(", "));
            return Ok(1);
        };

        if !MOBILE_SUBCOMMANDS.contains(&subcommand.as_str()) {
            eprintln!("Error: Unknown mobile subcommand '{subcommand}'");
            eprintln!("Valid subcommands: {}", MOBILE_SUBCOMMANDS.join(", "));
            return Ok(1);
        }

        // The script has its own subcommand parsing; pass everything through
        run_streaming(ctx, "mobile", "musiclib_mobile.sh", args, None).await
    }
}

pub struct BuildCommand;

#[async_trait]
impl Command for BuildCommand {
    fn name(&self) -> &'static str {
        "build"
    }

    fn description(&self) -> &'static str {
        "Full database build/rebuild from filesystem scan"
    }

    fn usage(&self) -> &'static str {
        "[--dry-run]"
    }

    fn help_detail(&self) -> &'static str {
        "Options:\n  \
         --dry-run   Preview changes without modifying database\n\n\
         Scans the music repository and builds/rebuilds the database,\n\
         preserving existing ratings where filepaths match. A backup is\n\
         created before any change."
    }

    async fn execute(&self, ctx: &CliContext, args: &[String]) -> Result<i32> {
        for arg in args {
            if arg != "--dry-run" {
                eprintln!("Error: Unknown option '{arg}'");
                return Ok(1);
            }
        }
        let dry_run = args.iter().any(|a| a == "--dry-run");

        let operation = if dry_run { "build-preview" } else { "build" };
        let code = run_streaming(ctx, operation, "musiclib_build.sh", args, None).await?;

        // Dry-run exit 1 is informational (differences found), not an error
        if code == 1 && dry_run {
            return Ok(0);
        }
        Ok(code)
    }
}

pub struct TagCleanCommand;

#[async_trait]
impl Command for TagCleanCommand {
    fn name(&self) -> &'static str {
        "tagclean"
    }

    fn description(&self) -> &'static str {
        "Clean and normalize audio file tags"
    }

    fn usage(&self) -> &'static str {
        "process|preview <target> [options...]"
    }

    fn help_detail(&self) -> &'static str {
        "Subcommands:\n  \
         preview <target>   Preview tag cleaning changes\n  \
         process <target>   Execute tag cleaning\n\n\
         Options:\n  \
         -r, --recursive    Process directories recursively\n  \
         --mode <mode>      Cleaning mode: merge|strip|embed-art"
    }

    async fn execute(&self, ctx: &CliContext, args: &[String]) -> Result<i32> {
        let Some(subcommand) = args.first() else {
            eprintln!("Error: 'tagclean' requires a subcommand (preview|process) and target");
            return Ok(1);
        };
        if subcommand != "preview" && subcommand != "process" {
            eprintln!("Error: Invalid tagclean subcommand '{subcommand}'");
            eprintln!("Expected: preview or process");
            return Ok(1);
        }
        if args.len() < 2 {
            eprintln!("Error: 'tagclean' requires a target (file or directory)");
            return Ok(1);
        }

        run_streaming(ctx, "tagclean", "musiclib_tagclean.sh", args, None).await
    }
}

pub struct TagRebuildCommand;

#[async_trait]
impl Command for TagRebuildCommand {
    fn name(&self) -> &'static str {
        "tagrebuild"
    }

    fn description(&self) -> &'static str {
        "Repair track tags from database values"
    }

    fn usage(&self) -> &'static str {
        "<filepath>"
    }

    fn help_detail(&self) -> &'static str {
        "Repairs track metadata by copying values from the database back\n\
         to the file tags. The target must already exist in musiclib.dsv."
    }

    async fn execute(&self, ctx: &CliContext, args: &[String]) -> Result<i32> {
        let [filepath] = args else {
            eprintln!("Error: 'tagrebuild' requires exactly 1 argument (filepath)");
            return Ok(1);
        };
        if !Path::new(filepath.as_str()).exists() {
            eprintln!("Error: File not found: {filepath}");
            return Ok(1);
        }

        run_streaming(ctx, "tagrebuild", "musiclib_tagrebuild.sh", args, None).await
    }
}

pub struct NewTracksCommand;

#[async_trait]
impl Command for NewTracksCommand {
    fn name(&self) -> &'static str {
        "new-tracks"
    }

    fn description(&self) -> &'static str {
        "Import new music downloads into library and database"
    }

    fn usage(&self) -> &'static str {
        "[artist_name]"
    }

    fn help_detail(&self) -> &'static str {
        "Imports new downloads from $NEW_DOWNLOAD_DIR: extracts archives,\n\
         pauses for tag editing, normalizes filenames and loudness, files\n\
         tracks under artist/album, and appends them to musiclib.dsv.\n\
         Prompts for the artist name when omitted."
    }

    async fn execute(&self, ctx: &CliContext, args: &[String]) -> Result<i32> {
        if args.len() > 1 {
            eprintln!("Error: 'new-tracks' accepts at most 1 argument (artist name)");
            return Ok(1);
        }

        run_streaming(ctx, "newtracks", "musiclib_new_tracks.sh", args, None).await
    }
}

pub struct ProcessPendingCommand;

#[async_trait]
impl Command for ProcessPendingCommand {
    fn name(&self) -> &'static str {
        "process-pending"
    }

    fn description(&self) -> &'static str {
        "Process deferred operations (queued ratings, etc.)"
    }

    fn usage(&self) -> &'static str {
        ""
    }

    fn help_detail(&self) -> &'static str {
        "Processes operations that were deferred because the database was\n\
         locked: queued rating changes and other pending updates."
    }

    async fn execute(&self, ctx: &CliContext, args: &[String]) -> Result<i32> {
        if !args.is_empty() {
            eprintln!("Warning: 'process-pending' ignores arguments");
        }

        run_streaming(ctx, "process-pending", "musiclib_process_pending.sh", &[], None).await
    }
}

pub struct SetupCommand;

#[async_trait]
impl Command for SetupCommand {
    fn name(&self) -> &'static str {
        "setup"
    }

    fn description(&self) -> &'static str {
        "Interactive first-run configuration wizard"
    }

    fn usage(&self) -> &'static str {
        "[--force]"
    }

    fn help_detail(&self) -> &'static str {
        "Options:\n  \
         --force    Overwrite existing configuration\n\n\
         Detects Audacious, locates the music repository, configures\n\
         download directories, and generates or updates musiclib.conf.\n\
         Can be re-run to update an existing configuration."
    }

    async fn execute(&self, ctx: &CliContext, args: &[String]) -> Result<i32> {
        for arg in args {
            if arg != "--force" {
                eprintln!("Error: Unknown option '{arg}'");
                return Ok(1);
            }
        }

        run_streaming(ctx, "setup", "musiclib_init_config.sh", args, None).await
    }
}
