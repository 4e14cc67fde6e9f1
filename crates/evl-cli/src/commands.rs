use std::sync::Arc;

use anyhow::bail;
use colored::Colorize;
use evl_forwarder::{
    DispatchReport, Dispatcher, EventForwarder, ForwarderStats, InMemoryEventSource, StatsSnapshot,
};
use evl_ledger::{
    HttpLedgerPublisher, InMemoryLedger, LedgerConfig, LedgerPublisher, LedgerSettings,
};
use evl_types::LedgerDocument;
use serde_json::json;

use crate::cli::*;
use crate::events::{load_events, select_events};
use crate::settings::Settings;

/// Environment lookup used for ledger configuration.
fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    match cli.command {
        Command::Check(_) => cmd_check(&settings),
        Command::Render(args) => cmd_render(args),
        Command::Forward(args) => cmd_forward(args, settings, cli.format).await,
    }
}

fn cmd_check(settings: &Settings) -> anyhow::Result<()> {
    let config = LedgerConfig::from_env(&settings.ledger)?;
    println!("{} Ledger configuration valid", "✓".green().bold());
    println!("  Endpoint: {}", config.endpoint.to_string().blue());
    println!("  Timeout: {}s", config.request_timeout.as_secs());
    println!("  Credential: {}", config.api_key.redacted().dimmed());
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    for event in select_events(load_events(&args.events)?, &args.names) {
        let name = event.namespaced_name();
        let document = match LedgerDocument::from_event(event) {
            Ok(document) => document,
            Err(e) => {
                eprintln!("{} {}: {}", "skipped".yellow(), name, e);
                continue;
            }
        };
        if args.pretty {
            println!("{}", serde_json::to_string_pretty(&document)?);
        } else {
            println!("{}", String::from_utf8(document.to_canonical_json()?)?);
        }
    }
    Ok(())
}

async fn cmd_forward(
    args: ForwardArgs,
    settings: Settings,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let dry_run = args.dry_run;
    let (report, snapshot) = forward_events(args, settings, env_lookup).await?;
    match format {
        OutputFormat::Text => print_summary(&report, &snapshot, dry_run),
        OutputFormat::Json => println!("{}", summary_json(&report, &snapshot)),
    }

    if !report.exhausted.is_empty() {
        bail!("{} event(s) could not be fetched", report.exhausted.len());
    }
    Ok(())
}

/// Choose the ledger a forward run publishes into.
fn publisher_for<F>(
    dry_run: bool,
    settings: &LedgerSettings,
    lookup: F,
) -> anyhow::Result<Arc<dyn LedgerPublisher>>
where
    F: Fn(&str) -> Option<String>,
{
    if dry_run {
        return Ok(Arc::new(InMemoryLedger::new()));
    }
    let config = LedgerConfig::from_lookup(settings, lookup)?;
    Ok(Arc::new(HttpLedgerPublisher::new(config)))
}

/// Reconcile every selected event in the file and tally the run.
async fn forward_events<F>(
    args: ForwardArgs,
    settings: Settings,
    lookup: F,
) -> anyhow::Result<(DispatchReport, StatsSnapshot)>
where
    F: Fn(&str) -> Option<String>,
{
    // A missing credential stops the run before any event is read.
    let publisher = publisher_for(args.dry_run, &settings.ledger, lookup)?;

    let events = select_events(load_events(&args.events)?, &args.names);
    let source = Arc::new(InMemoryEventSource::from_events(events));
    let names = source.names();
    let stats = Arc::new(ForwarderStats::new());
    let forwarder = Arc::new(EventForwarder::new(source, publisher).with_stats(stats.clone()));

    let mut dispatch = settings.dispatch;
    if let Some(concurrency) = args.concurrency {
        dispatch.concurrency = concurrency;
    }
    if let Some(max_attempts) = args.max_attempts {
        dispatch.max_attempts = max_attempts;
    }

    let report = Dispatcher::new(forwarder, dispatch).run(names).await;
    Ok((report, stats.snapshot()))
}

fn print_summary(report: &DispatchReport, stats: &StatsSnapshot, dry_run: bool) {
    let mode = if dry_run { " (dry run)" } else { "" };
    println!("{} Forwarded {} event(s){}", "✓".green().bold(), report.total(), mode);
    println!("  Stored: {}", stats.accepted.to_string().green());
    if stats.publish_failures > 0 {
        println!("  Publish failures: {}", stats.publish_failures.to_string().red());
    }
    for (name, reason) in &report.skipped {
        println!("  {} {} ({})", "skipped".yellow(), name, reason);
    }
    for (name, error) in &report.exhausted {
        println!("  {} {}: {}", "failed".red().bold(), name, error);
    }
    println!("  Attempts: {}", report.attempts);
}

fn summary_json(report: &DispatchReport, stats: &StatsSnapshot) -> serde_json::Value {
    json!({
        "events": report.total(),
        "attempts": report.attempts,
        "stored": stats.accepted,
        "publish_failures": stats.publish_failures,
        "skipped": report
            .skipped
            .iter()
            .map(|(name, reason)| json!({ "name": name.to_string(), "reason": reason.to_string() }))
            .collect::<Vec<_>>(),
        "exhausted": report
            .exhausted
            .iter()
            .map(|(name, error)| json!({ "name": name.to_string(), "error": error.to_string() }))
            .collect::<Vec<_>>(),
    })
}
