use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use llamamesh::source::model_name;
use llamamesh::{extract_obj, MeshEvent, MeshGenerator, ReplaySource};
use shared::config::Config;
use shared::llm::GenerationParams;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

const LOG_LEVEL: tracing::Level = tracing::Level::INFO;
#[cfg(not(debug_assertions))]
const LLAMAMESH_LEVEL: &str = "llamamesh=INFO";
#[cfg(debug_assertions)]
const LLAMAMESH_LEVEL: &str = "llamamesh=DEBUG";

const SAMPLE_TRANSCRIPT: &str = r#"<|start_text_id|>Here is a simple table in OBJ format:
```obj
v 0 0 0
v 1 0 0
v 1 0 1
v 0 0 1
v 0 1 0
v 1 1 0
v 1 1 1
v 0 1 1
f 5 6 7
f 5 7 8
f 1 2 6
f 1 6 5
```
Let me know if you want any changes."#;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// What to model.
    #[arg(short, long, default_value = "Create a simple 3D model of a table in OBJ format.")]
    prompt: String,
    /// Recorded model output to replay. Uses a built in sample if not set.
    #[arg(short, long)]
    transcript: Option<PathBuf>,
    /// Model file, only used to label the run.
    #[arg(long)]
    model: Option<PathBuf>,
    #[arg(long)]
    max_tokens: Option<u32>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    seed: Option<u32>,
    /// Delay between replayed tokens, in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Ask the model to continue after the first generation.
    #[arg(long = "continue")]
    continue_generation: bool,
    /// Where to save the final mesh. Defaults to the data dir.
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn setup_logging(config: &Config) -> anyhow::Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(config.logs_dir(), "llamamesh.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(LOG_LEVEL.into())
                .add_directive(LLAMAMESH_LEVEL.parse().context("Invalid EnvFilter")?),
        )
        .with(fmt::Layer::new().with_writer(io::stderr))
        .with(fmt::Layer::new().with_ansi(false).with_writer(non_blocking));
    tracing::subscriber::set_global_default(subscriber)
        .context("Unable to set a global subscriber")?;
    LogTracer::init().context("Unable to initialize LogTracer")?;

    Ok(guard)
}

fn generation_params(args: &CliArgs, defaults: GenerationParams) -> GenerationParams {
    GenerationParams {
        max_tokens: args.max_tokens.unwrap_or(defaults.max_tokens),
        temperature: args.temperature.unwrap_or(defaults.temperature),
        seed: args.seed.unwrap_or(defaults.seed),
    }
    .clamped()
}

/// Prints progress as updates come in.
async fn display_events(mut rx: mpsc::Receiver<MeshEvent>) {
    let mut stdout = io::stdout();
    let mut printed = 0;

    while let Some(event) = rx.recv().await {
        log::trace!("event: {}", event.as_ref());
        match event {
            MeshEvent::Started(prompt) => {
                log::info!("generating for: {}", prompt.system_prompt());
                printed = 0;
            }
            MeshEvent::Update(update) => {
                let raw = update.output.raw();
                if let Some(new_text) = raw.get(printed..) {
                    let _ = write!(stdout, "{new_text}");
                    let _ = stdout.flush();
                }
                printed = raw.len();

                if let Some(asset) = update.asset {
                    log::debug!(
                        "renderable mesh: {} vertices, {} triangles ({:.1} token/s)",
                        asset.vertices.len(),
                        asset.triangle_count(),
                        update.tokens_per_second
                    );
                }
            }
            MeshEvent::Done(summary) => {
                let _ = writeln!(stdout);
                log::info!(
                    "{} tokens, ~{} token/s, vertices: {}, faces: {}{}",
                    summary.tokens,
                    summary.tokens_per_second as u64,
                    summary.output.vertices(),
                    summary.output.faces(),
                    if summary.cancelled { " (cancelled)" } else { "" }
                );
            }
        }
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = Config::new()?;
    let _log_guard = setup_logging(&config)?;

    log::info!("Loading prefs from: {:?}", config.prefs_file());
    if let Some(name) = args.model.as_deref().and_then(model_name) {
        log::info!("Selected model: {name}");
    }

    let settings = &config.user_settings;
    let source = match &args.transcript {
        Some(path) => ReplaySource::from_file(path)?,
        None => ReplaySource::new(SAMPLE_TRANSCRIPT),
    };
    let delay = args.delay_ms.unwrap_or(settings.token_delay_ms);
    let source = source.with_delay(Duration::from_millis(delay));

    let mut generator = MeshGenerator::from_settings(source, settings)
        .with_params(generation_params(&args, settings.generation));
    if settings.keep_asset_files {
        generator = generator.with_asset_dir(config.meshes_dir());
    }
    let generator = Arc::new(generator);

    // Ctrl-C stops the current generation instead of killing the process.
    let canceller = generator.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let (tx, rx) = mpsc::channel(10);
    let display = tokio::spawn(display_events(rx));

    let mut summary = generator.generate(&args.prompt, Some(tx.clone())).await?;
    let mut raw = summary.output.raw().to_string();
    if args.continue_generation && !summary.cancelled && summary.error.is_none() {
        summary = generator.continue_generating(&raw, Some(tx.clone())).await?;
        raw.push_str(summary.output.raw());
    }
    drop(tx);
    let _ = display.await;

    if let Some(err) = &summary.error {
        log::error!("generation stopped early: {err}");
    }

    let out = match args.out {
        Some(path) => path,
        None => {
            let dir = config.meshes_dir();
            std::fs::create_dir_all(&dir)?;
            dir.join("mesh.obj")
        }
    };
    std::fs::write(&out, extract_obj(&raw))
        .with_context(|| format!("Unable to save mesh to {out:?}"))?;
    log::info!("saved mesh to {:?}", out);

    Ok(())
}
