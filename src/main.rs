//! varlog - headless processing pipeline
//!
//! Loads a session file, then reads one sample group per line from stdin and
//! prints pipeline messages as JSON lines on stdout. The words `stop` and
//! `clear` on a line of their own are sent as commands.
//!
//! ```text
//! varlog session.toml < samples.jsonl
//! ```

use anyhow::{bail, Context};
use std::io::{BufRead, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use varlog_rs::{
    config::SessionFile,
    pipeline::{ProcessingBridge, SinkMessage},
    types::SampleGroup,
};

fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr; stdout carries pipeline output
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,varlog_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: varlog <session.toml|session.json>");
    };
    let session = SessionFile::load(&path).with_context(|| format!("loading {}", path))?;
    tracing::info!(
        "Starting pipeline for group '{}'",
        session.processing.groupname
    );

    let mut bridge = ProcessingBridge::spawn_default().context("spawning pipeline")?;
    let printer = {
        let msg_rx = bridge.msg_rx.clone();
        std::thread::Builder::new()
            .name("varlog-printer".to_string())
            .spawn(move || -> anyhow::Result<()> {
                let stdout = std::io::stdout();
                for msg in msg_rx.iter() {
                    let mut out = stdout.lock();
                    writeln!(out, "{}", serde_json::to_string(&msg)?)?;
                    out.flush()?;
                    if msg == SinkMessage::Shutdown {
                        break;
                    }
                }
                Ok(())
            })
            .context("spawning output thread")?
    };

    bridge.initialize(
        session.processing.clone(),
        Some(session.log_directory()),
        session.linked_group(),
    )?;

    for (number, line) in std::io::stdin().lock().lines().enumerate() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        match line {
            "" => continue,
            "stop" => bridge.stop()?,
            "clear" => bridge.clear()?,
            _ => match serde_json::from_str::<SampleGroup>(line) {
                Ok(group) => bridge.input(group)?,
                Err(e) => tracing::warn!("Skipping line {}: {}", number + 1, e),
            },
        }
    }

    tracing::info!("Shutting down...");
    bridge.shutdown()?;
    match printer.join() {
        Ok(result) => result?,
        Err(_) => bail!("output thread panicked"),
    }
    Ok(())
}
