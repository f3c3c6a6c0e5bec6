//! Native subcommands answered from the record store
//!
//! The CLI rendition of the library browsing the GUI used to provide:
//! a tabular track listing (optionally filtered to one album) and a live
//! watch that reports debounced reloads as the scripts rewrite the
//! database.

use anyhow::Result;
use async_trait::async_trait;

use musiclib_common::display::{format_duration, format_last_played};
use musiclib_common::events::MusiclibEvent;
use musiclib_common::library::Library;
use musiclib_common::watcher::DatabaseWatcher;

use crate::commands::{CliContext, Command};

pub struct TracksCommand;

#[async_trait]
impl Command for TracksCommand {
    fn name(&self) -> &'static str {
        "tracks"
    }

    fn description(&self) -> &'static str {
        "List tracks from the database"
    }

    fn usage(&self) -> &'static str {
        "[--album <id>]"
    }

    fn help_detail(&self) -> &'static str {
        "Options:\n  \
         --album <id>   Only tracks whose album identifier equals <id>\n\n\
         Reads musiclib.dsv (config key DB_FILE) and prints one line per\n\
         track in file order."
    }

    async fn execute(&self, ctx: &CliContext, args: &[String]) -> Result<i32> {
        let album = match args {
            [] => None,
            [flag, id] if flag == "--album" => Some(id.clone()),
            _ => {
                eprintln!("Error: usage: musiclib-cli tracks [--album <id>]");
                return Ok(1);
            }
        };

        let library = Library::open(ctx.database_path(), ctx.events.clone());
        if let Err(e) = library.reload() {
            eprintln!("Error: {e}");
            return Ok(1);
        }

        let snapshot = library.snapshot();
        let records: Vec<_> = match &album {
            Some(id) => library.records_for_album(id),
            None => snapshot.iter().cloned().collect(),
        };

        println!(
            "{:<6} {:<22} {:<24} {:<28} {:>5} {:>7}  {}",
            "ID", "Artist", "Album", "Title", "Stars", "Length", "Last Played"
        );
        for record in &records {
            println!(
                "{:<6} {:<22} {:<24} {:<28} {:>5} {:>7}  {}",
                record.id,
                record.artist,
                record.album,
                record.title,
                record.stars,
                format_duration(&record.length_ms),
                format_last_played(&record.last_played),
            );
        }
        println!();
        match &album {
            Some(id) => println!("{} tracks on album {id}", records.len()),
            None => println!("{} tracks", records.len()),
        }

        Ok(0)
    }
}

pub struct WatchCommand;

#[async_trait]
impl Command for WatchCommand {
    fn name(&self) -> &'static str {
        "watch"
    }

    fn description(&self) -> &'static str {
        "Watch the database and report each debounced reload"
    }

    fn usage(&self) -> &'static str {
        ""
    }

    fn help_detail(&self) -> &'static str {
        "Loads musiclib.dsv, then watches it for external changes. Bursts\n\
         of change notifications (temp-file-and-rename writes) coalesce\n\
         into a single reload. Ctrl-C stops watching."
    }

    async fn execute(&self, ctx: &CliContext, _args: &[String]) -> Result<i32> {
        let mut rx = ctx.events.subscribe();
        let library = Library::open(ctx.database_path(), ctx.events.clone());

        match library.reload() {
            Ok(tracks) => {
                println!("Loaded {tracks} tracks from {}", library.path().display())
            }
            Err(e) => eprintln!("{e} - waiting for the file to appear"),
        }
        // Only report changes from here on
        while rx.try_recv().is_ok() {}

        let watcher = DatabaseWatcher::spawn(library)?;
        println!("Watching for changes (Ctrl-C to stop)...");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = rx.recv() => match event {
                    Ok(MusiclibEvent::DatabaseLoaded { tracks, .. }) => {
                        println!("Database reloaded: {tracks} tracks");
                    }
                    Ok(MusiclibEvent::DatabaseLoadFailed { message, .. }) => {
                        eprintln!("Reload failed: {message} (keeping previous records)");
                    }
                    Ok(_) => {}
                    Err(_) => break,
                },
            }
        }

        watcher.stop();
        Ok(0)
    }
}
