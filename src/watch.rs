//! Polling daemon: runs sync cycles on a fixed interval until Ctrl-C.

use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::config::mailtext_config;
use crate::sync::build_coordinator;
use crate::sync::coordinator::ThreadSleeper;
use crate::sync::types::CycleReport;
use crate::util::run_cmd;

/// Program and arguments that show a desktop notification on this platform.
fn notification_command(title: &str, body: &str) -> Option<(&'static str, Vec<String>)> {
    if cfg!(target_os = "macos") {
        let script = format!(
            "display notification \"{}\" with title \"{}\"",
            body.replace('"', "'"),
            title.replace('"', "'")
        );
        Some(("osascript", vec!["-e".to_string(), script]))
    } else if cfg!(target_os = "linux") {
        Some(("notify-send", vec![title.to_string(), body.to_string()]))
    } else {
        None
    }
}

/// Desktop notification (best-effort).
fn notify(title: &str, body: &str) {
    let Some((program, args)) = notification_command(title, body) else {
        return;
    };
    match run_cmd(program, &args) {
        Ok(out) if out.success() => {}
        Ok(out) => debug!(
            "{} exited with code {}: {}",
            program,
            out.code,
            out.stderr.trim()
        ),
        Err(e) => debug!("Could not run {}: {}", program, e),
    }
}

/// Notification text for a finished cycle, if it is worth one.
pub fn notification_text(report: &CycleReport) -> Option<String> {
    (report.extracted > 0).then(|| format!("{} new file(s) extracted", report.extracted))
}

/// mailtext watch [--interval N]
#[tokio::main]
pub async fn run(interval_override: Option<u64>) -> Result<()> {
    let config = mailtext_config::load_config(None)?;
    let interval = interval_override.unwrap_or(config.watch.poll_interval);

    // Session failure at startup is fatal; later failures are retried.
    let mut coordinator = build_coordinator(&config, interval_override)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // Handle Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        println!("\nReceived signal, shutting down...");
        shutdown_clone.store(true, Ordering::Relaxed);
    });

    println!(
        "mailtext watch: monitoring for PDF/JPG/PNG attachments every {}s (Ctrl-C to stop)",
        interval
    );

    let notify_enabled = config.watch.notify;

    // The cycle blocks on network, disk and extraction; keep it off the runtime.
    let flag = shutdown.clone();
    let cycles = tokio::task::spawn_blocking(move || {
        let mut sleeper = ThreadSleeper;
        let cycles = coordinator.run_with(&mut sleeper, &flag, |report| {
            if notify_enabled {
                if let Some(text) = notification_text(report) {
                    notify("mailtext", &text);
                }
            }
        });
        coordinator.source_mut().logout();
        cycles
    })
    .await?;

    info!("Completed {} cycle(s)", cycles);
    println!("mailtext watch: stopped");
    Ok(())
}
