//! Queue videos for transcription and streamed summarization, then wait for
//! the exported summaries.

use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use summary_pulse::{
    templates::{default_templates, find_template},
    tracing::init_tracing_subscriber,
    BackendClient, EventFilter, LogNotifier, MarkdownExporter, PushChannelClient,
    SummaryOrchestratorBuilder,
};
use task_ledger::{LedgerEvent, Task, TaskKind, TaskLedger, TaskStatus};
use tokio::sync::broadcast;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(author, version, about = "Turn videos into text summaries")]
struct Cli {
    /// WebSocket endpoint of the processing service.
    #[arg(
        long,
        env = "CHANNEL_ENDPOINT",
        default_value = "ws://127.0.0.1:8787/ws"
    )]
    channel_endpoint: String,

    /// Base URL of the processing service's HTTP API.
    #[arg(long, env = "BACKEND_URL", default_value = "http://127.0.0.1:8787")]
    backend_url: String,

    /// Directory the markdown summaries are written to.
    #[arg(long, env = "SUMMARY_OUTPUT_DIR", default_value = "summaries")]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Queue one or more videos, process them, and wait for the summaries.
    Run {
        /// Video files or http(s) URLs.
        #[arg(required = true)]
        sources: Vec<String>,

        /// Template id; see the `templates` subcommand.
        #[arg(long, default_value = "summary")]
        template: String,

        /// Display label for the task. Only applies to a single source.
        #[arg(long)]
        label: Option<String>,

        /// Prepend a table of contents to each exported summary.
        #[arg(long)]
        toc: bool,
    },
    /// List the built-in summary templates.
    Templates,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let _guard = sentry::init((
        env::var("SENTRY_DSN").unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(
                env::var("SENTRY_ENVIRONMENT")
                    .unwrap_or_else(|_| "development".to_string())
                    .into(),
            ),
            ..Default::default()
        },
    ));

    init_tracing_subscriber()?;

    start(cli)
}

#[tokio::main(flavor = "current_thread")]
async fn start(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        channel_endpoint,
        backend_url,
        output_dir,
        command,
    } = cli;

    match command {
        Command::Templates => {
            for template in default_templates() {
                println!("{:<10} {}", template.id, template.name);
            }
            Ok(())
        }
        Command::Run {
            sources,
            template,
            label,
            toc,
        } => {
            run_batch(
                &channel_endpoint,
                &backend_url,
                &output_dir,
                sources,
                &template,
                label,
                toc,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_batch(
    channel_endpoint: &str,
    backend_url: &str,
    output_dir: &Path,
    sources: Vec<String>,
    template_id: &str,
    label: Option<String>,
    toc: bool,
) -> anyhow::Result<()> {
    let Some(template) = find_template(template_id) else {
        let known = default_templates()
            .iter()
            .map(|t| t.id.clone())
            .collect::<Vec<_>>()
            .join(", ");
        bail!("unknown template {template_id:?}; available: {known}");
    };

    let backend = BackendClient::new(backend_url)?;
    let ledger = Arc::new(TaskLedger::new());

    let shared_label = if sources.len() == 1 { label } else { None };
    for source in &sources {
        enqueue_source(&ledger, &backend, source, shared_label.clone()).await?;
    }

    let client = PushChannelClient::new();
    let mut connected = client.on(EventFilter::Connected);

    let exporter = MarkdownExporter::new(output_dir);
    let exporter = if toc { exporter.with_toc() } else { exporter };

    let orchestrator = SummaryOrchestratorBuilder::new(ledger.clone())
        .channel(client.clone())
        .streamer(backend.clone())
        .exporter(exporter)
        .notifier(LogNotifier)
        .build();

    let mut ledger_events = ledger.subscribe();

    client.connect(channel_endpoint);
    tokio::time::timeout(CONNECT_TIMEOUT, connected.recv())
        .await
        .context("timed out waiting for the processing service")?
        .context("channel client went away before connecting")?;

    let started = orchestrator.start_processing(Some(&template));
    tracing::info!(started, template = %template.id, "Batch submitted");

    let runner = orchestrator.clone();
    let event_loop = tokio::spawn(async move { runner.run().await });

    let outcome = wait_for_completion(&ledger, &mut ledger_events).await;

    event_loop.abort();
    client.disconnect().await;

    report(&outcome)
}

async fn enqueue_source(
    ledger: &TaskLedger,
    backend: &BackendClient,
    source: &str,
    label: Option<String>,
) -> anyhow::Result<()> {
    if source.starts_with("http://") || source.starts_with("https://") {
        ledger.enqueue(TaskKind::Url, source, label)?;
        return Ok(());
    }

    let path = Path::new(source);
    if !path.is_file() {
        bail!("{source}: not a file or http(s) url");
    }
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let uploaded = backend
        .upload_file(path)
        .await
        .with_context(|| format!("failed to upload {source}"))?;
    ledger.enqueue(TaskKind::File, uploaded.path, label.or(file_name))?;
    Ok(())
}

/// Blocks until every queued task settles, or until ctrl-c.
async fn wait_for_completion(
    ledger: &TaskLedger,
    events: &mut broadcast::Receiver<LedgerEvent>,
) -> Vec<Task> {
    loop {
        let tasks = ledger.list();
        if tasks.iter().all(|t| t.status.is_terminal()) {
            return tasks;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted; leaving remaining tasks unfinished");
                return ledger.list();
            }
            event = events.recv() => match event {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return ledger.list(),
            },
        }
    }
}

fn report(outcome: &[Task]) -> anyhow::Result<()> {
    for task in outcome {
        match task.status {
            TaskStatus::Completed => tracing::info!(
                task = %task.display_name(),
                output = task.output_path.as_deref().unwrap_or_default(),
                "Summary written"
            ),
            TaskStatus::Failed => tracing::error!(
                task = %task.display_name(),
                error = task.error.as_deref().unwrap_or_default(),
                "Task failed"
            ),
            _ => tracing::warn!(task = %task.display_name(), "Task left unfinished"),
        }
    }

    let failed = outcome
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .count();
    if failed > 0 {
        bail!("{failed} of {} tasks failed", outcome.len());
    }
    Ok(())
}
