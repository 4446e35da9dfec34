use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

use flow_schedule::cli::{Cli, Command};
use flow_schedule::provider::SchemaProvider;
use flow_schedule::sink::{Notice, NoticeLevel, PIPELINE_TICKS, ProgressCounter, UiEvent};
use flow_schedule::store::{Weekday, lock_store};
use flow_schedule::{ScheduleEngine, tree, validator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command.clone() {
        Command::Check { file } => check(&cli, &file).await,
        Command::Import { file } => import(&cli, &file).await,
        Command::Convert { input, output } => convert(&cli, &input, &output).await,
    }
}

async fn check(cli: &Cli, file: &Path) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    let root = tree::parse(&text)?;

    let provider = SchemaProvider::new(cli.schema_url.clone(), Duration::from_secs(cli.timeout));
    match provider.get().await {
        Some(schema) => match validator::validate(&root, &schema) {
            Ok(()) => {
                println!("{} validates", file.display());
                Ok(())
            }
            Err(failure) => bail!("{} fails to validate: {}", file.display(), failure.detail),
        },
        None => {
            eprintln!("warning: no usable schema, validation skipped");
            println!("{} is well-formed XML", file.display());
            Ok(())
        }
    }
}

async fn import(cli: &Cli, file: &Path) -> anyhow::Result<()> {
    let (engine, mut rx) = ScheduleEngine::new(cli.engine_config());
    let task = engine.spawn_import(file);
    let ok = drain_one_run(&mut rx).await;
    task.await.context("import task panicked")?;
    if !ok {
        bail!("import aborted");
    }

    let store = engine.store();
    let store = lock_store(&store);
    println!(
        "imported {}: {} zones, {} playlists",
        file.display(),
        store.zones().count(),
        store.playlists().count()
    );
    for day in Weekday::ALL {
        let entries = store.entries(day);
        if !entries.is_empty() {
            let slots: Vec<String> = entries
                .iter()
                .map(|e| format!("{} {}", e.start, e.zone))
                .collect();
            println!("  {}: {}", day.abbrev(), slots.join(", "));
        }
    }
    Ok(())
}

async fn convert(cli: &Cli, input: &Path, output: &Path) -> anyhow::Result<()> {
    let (engine, mut rx) = ScheduleEngine::new(cli.engine_config());

    let task = engine.spawn_import(input);
    let ok = drain_one_run(&mut rx).await;
    task.await.context("import task panicked")?;
    if !ok {
        bail!("import aborted");
    }

    let task = engine.spawn_export(output);
    let ok = drain_one_run(&mut rx).await;
    task.await.context("export task panicked")?;
    if !ok {
        bail!("export aborted");
    }

    println!("wrote {}", output.display());
    Ok(())
}

/// Drain events until the current run finishes. Returns false if the run
/// reported an error notice.
async fn drain_one_run(rx: &mut UnboundedReceiver<UiEvent>) -> bool {
    let mut progress = ProgressCounter::new(PIPELINE_TICKS);
    let mut ok = true;
    while let Some(event) = rx.recv().await {
        match event {
            UiEvent::Tick => {
                eprint!("\r[{:>3.0}%]", progress.tick() * 100.0);
            }
            UiEvent::Notify(notice) => {
                eprintln!();
                print_notice(&notice);
                if notice.level == NoticeLevel::Error {
                    ok = false;
                }
            }
            UiEvent::Finish { imported } => {
                eprintln!();
                if let Some(path) = imported {
                    tracing::info!(path = %path.display(), "schedule loaded");
                }
                break;
            }
        }
    }
    ok
}

fn print_notice(notice: &Notice) {
    let prefix = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    eprintln!("{prefix}: {}", notice.message);
    if let Some(detail) = &notice.detail {
        eprintln!("  {detail}");
    }
    if let Some(consequence) = &notice.consequence {
        eprintln!("  {consequence}");
    }
}
