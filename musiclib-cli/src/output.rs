//! Terminal output for script runs
//!
//! Prints script stdout as it arrives, renders the structured JSON error
//! payload when a failing script provides one (raw stderr otherwise), and
//! turns the classified outcome into the process exit code.

use anyhow::Result;

use musiclib_common::events::{MusiclibEvent, ScriptOutcome};
use musiclib_common::script::{parse_error_payload, DEFERRED_EXIT_CODE};
use musiclib_common::Error;

use crate::commands::CliContext;

/// Launch a script and stream it to the terminal until it finishes
///
/// Ctrl-C triggers cooperative cancellation (SIGTERM, grace, kill) of the
/// running script. Returns the process exit code to report.
pub async fn run_streaming(
    ctx: &CliContext,
    operation: &str,
    script_name: &str,
    args: &[String],
    stdin_payload: Option<&str>,
) -> Result<i32> {
    let mut rx = ctx.events.subscribe();

    let handle = match ctx.runner.run(operation, script_name, args, stdin_payload) {
        Ok(handle) => handle,
        Err(Error::ScriptNotFound(name)) => {
            eprintln!("Error: Could not find script: {name}");
            eprintln!("Searched in:");
            eprintln!("  - MUSICLIB_SCRIPT_PATH environment variable");
            eprintln!("  - /usr/lib/musiclib/bin/");
            eprintln!("  - ~/musiclib/bin/ and the current directory");
            return Ok(2);
        }
        Err(e) => {
            eprintln!("Error: Failed to start script: {e}");
            return Ok(2);
        }
    };

    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                MusiclibEvent::ScriptOutput { line, .. } => println!("{line}"),
                MusiclibEvent::ScriptFinished { .. } => break,
                _ => {}
            }
        }
    });

    let interrupt_runner = ctx.runner.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted - cancelling running operation...");
            interrupt_runner.cancel();
        }
    });

    let outcome = handle.wait().await;
    let _ = printer.await;
    interrupt.abort();

    Ok(report_outcome(&outcome))
}

/// Render the outcome and map it to an exit code
pub fn report_outcome(outcome: &ScriptOutcome) -> i32 {
    match outcome {
        ScriptOutcome::Success => 0,
        ScriptOutcome::Deferred => {
            println!("Operation accepted - database busy; queued work will be retried automatically.");
            DEFERRED_EXIT_CODE
        }
        ScriptOutcome::Failed { exit_code, message } => {
            print_script_failure(message, *exit_code);
            exit_code.unwrap_or(1)
        }
    }
}

/// Show a script failure: formatted JSON payload when present, raw stderr
/// text otherwise
fn print_script_failure(message: &str, exit_code: Option<i32>) {
    if let Some(payload) = parse_error_payload(message) {
        eprintln!("Error: {}", payload.error);
        eprintln!("Script: {} (exit code {})", payload.script, payload.code);
        if let Some(context) = payload.context {
            if !context.is_empty() {
                eprintln!("Context:");
                for (key, value) in context {
                    let value = match value.as_str() {
                        Some(text) => text.to_string(),
                        None => value.to_string(),
                    };
                    eprintln!("  {key}: {value}");
                }
            }
        }
        return;
    }

    if message.is_empty() {
        let code = exit_code.map(|c| c.to_string()).unwrap_or_else(|| "?".into());
        eprintln!("Script failed with exit code {code} (no error details)");
    } else {
        eprintln!("Script error output:");
        eprintln!("{message}");
    }
}
