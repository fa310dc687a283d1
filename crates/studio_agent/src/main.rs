use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use file_patch::Disposition;
use stream_source_mock::{Script, ScriptedSource};
use studio_agent::logging::init_tracing;
use studio_agent::{
    ImageAttachment, StudioConfig, TurnController, TurnEvent, TurnInput, TurnObserver,
};
use tracing::debug;

#[derive(Parser)]
#[command(name = "studio-agent")]
#[command(about = "Run one studio turn against a scripted response", long_about = None)]
struct Cli {
    /// Response text to replay. Defaults to a built-in starter page.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Attach an image to the turn. Repeatable.
    #[arg(long = "image")]
    images: Vec<PathBuf>,

    /// Scope the prompt to a CSS selector. Repeatable.
    #[arg(long = "select")]
    selectors: Vec<String>,

    /// Write the resulting file store under this directory.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Delay before each replayed chunk.
    #[arg(long, default_value_t = 0)]
    chunk_delay_ms: u64,

    prompt: String,
}

struct TraceObserver;

impl TurnObserver for TraceObserver {
    fn on_event(&self, event: &TurnEvent) {
        match event {
            TurnEvent::StatusChanged(status) => debug!(?status, "status changed"),
            TurnEvent::MessageUpdated(message) => debug!(
                chars = message.text.len(),
                live_changes = message.changes.as_ref().map_or(0, Vec::len),
                "message streaming"
            ),
            TurnEvent::MessageFinalized(message) => debug!(id = %message.id, "message finalized"),
            _ => {}
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = StudioConfig::from_env().context("failed to load studio configuration")?;
    let delay = Duration::from_millis(cli.chunk_delay_ms);
    let source = match &cli.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read script {}", path.display()))?;
            ScriptedSource::new(Script::from_response_text(&text).paced(delay))
        }
        None => ScriptedSource::default(),
    };

    let controller = Arc::new(
        TurnController::new(Arc::new(source), config).with_observer(Arc::new(TraceObserver)),
    );
    controller.set_selected_elements(cli.selectors.clone());

    let stopper = Arc::clone(&controller);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop_generation();
        }
    });

    let input = cli
        .images
        .iter()
        .fold(TurnInput::new(cli.prompt.clone()), |input, path| {
            input.with_image(ImageAttachment::from_path(path))
        });
    let report = controller.send_message(input).await?;

    let messages = controller.messages();
    if let Some(message) = messages
        .iter()
        .find(|message| message.id == report.assistant_message_id)
    {
        if !message.text.is_empty() {
            println!("{}", message.text);
        }
        if let Some(error) = &message.error {
            eprintln!("error: {error}");
        }
    }
    println!("outcome: {:?}", report.outcome);

    if let Some(patch) = &report.patch {
        for change in &patch.reports {
            let status = match change.disposition {
                Disposition::Applied => "applied".to_string(),
                Disposition::Skipped(reason) => format!("skipped ({reason:?})"),
                Disposition::Rejected(reason) => format!("rejected ({reason:?})"),
            };
            println!("{:?} {} {status}", change.kind, change.path);
        }
    }

    let store = controller.file_store();
    println!("files:");
    for path in store.paths() {
        println!("  {path}");
    }

    if let Some(out) = &cli.out {
        let written = store
            .write_tree(out)
            .with_context(|| format!("failed to export files to {}", out.display()))?;
        println!("wrote {written} files to {}", out.display());
    }

    Ok(())
}
