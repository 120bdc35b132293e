use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::StreamExt;
use shared::config::UserSettings;
use shared::llm::GenerationParams;
use strum_macros::AsRefStr;
use tokio::sync::mpsc;

use crate::asset::{obj_file_path, MeshAsset};
use crate::error::{GenerateError, StreamError};
use crate::output::MeshOutput;
use crate::prompt::Prompt;
use crate::source::TokenSource;
use crate::stream::MeshStreamer;

/// Progress of a running generation.
#[derive(Clone, Debug)]
pub struct MeshUpdate {
    /// Tokens received so far.
    pub tokens: usize,
    pub tokens_per_second: f64,
    pub output: MeshOutput,
    /// Present on every `render_every`th update when the mesh text parses.
    pub asset: Option<MeshAsset>,
}

#[derive(Clone, Debug)]
pub struct GenerationSummary {
    pub prompt: Prompt,
    /// Final raw output, including a token that arrived after cancellation.
    pub output: MeshOutput,
    pub tokens: usize,
    pub elapsed: Duration,
    pub tokens_per_second: f64,
    pub cancelled: bool,
    /// Error that cut the generation short. Updates sent before it are
    /// still valid.
    pub error: Option<StreamError>,
    pub asset: Option<MeshAsset>,
}

// Generation is roughly the order things happen.
#[derive(AsRefStr, Debug)]
pub enum MeshEvent {
    Started(Prompt),
    Update(MeshUpdate),
    Done(GenerationSummary),
}

/// Marks the generator idle however the generation ends.
struct SessionGuard<'a> {
    is_generating: &'a AtomicBool,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.is_generating.store(false, Ordering::SeqCst);
    }
}

/// Drives one generation at a time against a token source.
pub struct MeshGenerator<S> {
    source: S,
    streamer: MeshStreamer,
    params: GenerationParams,
    render_every: usize,
    asset_dir: Option<PathBuf>,
    is_generating: AtomicBool,
    last_system_prompt: Mutex<Option<String>>,
}

impl<S: TokenSource> MeshGenerator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            streamer: MeshStreamer::new(),
            params: GenerationParams::default(),
            render_every: 10,
            asset_dir: None,
            is_generating: AtomicBool::new(false),
            last_system_prompt: Mutex::new(None),
        }
    }

    pub fn from_settings(source: S, settings: &UserSettings) -> Self {
        Self::new(source)
            .with_params(settings.generation)
            .with_render_every(settings.render_every)
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params.clamped();
        self
    }

    pub fn with_render_every(mut self, render_every: usize) -> Self {
        self.render_every = render_every;
        self
    }

    /// Save materialized assets in `dir`, one `.obj` file per generation that
    /// each new asset overwrites.
    pub fn with_asset_dir(mut self, dir: PathBuf) -> Self {
        self.asset_dir = Some(dir);
        self
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating.load(Ordering::SeqCst)
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.last_system_prompt
            .lock()
            .map(|prompt| prompt.clone())
            .unwrap_or_default()
    }

    /// Stop the running generation at the next token. Once a generation
    /// has returned this has no effect on it or on the ones after it.
    pub fn cancel(&self) {
        log::info!("cancelling generation");
        self.streamer.cancel();
    }

    /// Start a new conversation with `system_prompt`.
    pub async fn generate(
        &self,
        system_prompt: &str,
        events: Option<mpsc::Sender<MeshEvent>>,
    ) -> Result<GenerationSummary, GenerateError> {
        let system_prompt = system_prompt.trim();
        if system_prompt.is_empty() {
            return Err(GenerateError::EmptyPrompt);
        }

        self.run(Prompt::begin(system_prompt), events).await
    }

    /// Ask the model to keep going from `raw_output` of the last generation.
    pub async fn continue_generating(
        &self,
        raw_output: &str,
        events: Option<mpsc::Sender<MeshEvent>>,
    ) -> Result<GenerationSummary, GenerateError> {
        let system_prompt = self
            .last_system_prompt()
            .ok_or(GenerateError::NoPreviousPrompt)?;

        self.run(Prompt::continuation(system_prompt, raw_output), events)
            .await
    }

    fn try_start(&self) -> Result<SessionGuard<'_>, GenerateError> {
        self.is_generating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| GenerateError::AlreadyGenerating)?;

        Ok(SessionGuard {
            is_generating: &self.is_generating,
        })
    }

    fn materialize(&self, output: &MeshOutput, path: Option<&Path>) -> Option<MeshAsset> {
        let res = match path {
            Some(path) => output.write_asset(path),
            None => output.make_asset(),
        };

        match res {
            Ok(asset) => Some(asset),
            Err(err) => {
                log::debug!("mesh not renderable yet: {err}");
                None
            }
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn run(
        &self,
        prompt: Prompt,
        events: Option<mpsc::Sender<MeshEvent>>,
    ) -> Result<GenerationSummary, GenerateError> {
        let _guard = self.try_start()?;

        if let Prompt::Begin { system_prompt } = &prompt {
            if let Ok(mut last) = self.last_system_prompt.lock() {
                *last = Some(system_prompt.clone());
            }
        }

        let input = if self.source.keeps_context() {
            prompt.session_input()
        } else {
            prompt.formatted()
        };
        log::debug!(
            "prompt (fresh context: {}): {input}",
            prompt.starts_fresh_context()
        );

        if let Some(tx) = &events {
            let _ = tx.send(MeshEvent::Started(prompt.clone())).await;
        }

        let asset_path = self.asset_dir.as_deref().map(obj_file_path);
        let mut stream = self.streamer.stream(&input, &self.params, &self.source);
        let mut error = None;
        let mut updates = 0;

        while let Some(item) = stream.next().await {
            let output = match item {
                Ok(output) => output,
                Err(err) => {
                    error = Some(err);
                    break;
                }
            };

            updates += 1;
            let asset = if self.render_every > 0 && updates % self.render_every == 0 {
                self.materialize(&output, asset_path.as_deref())
            } else {
                None
            };

            if let Some(tx) = &events {
                let update = MeshUpdate {
                    tokens: stream.session().token_count(),
                    tokens_per_second: stream.session().tokens_per_second(),
                    output,
                    asset,
                };

                if tx.send(MeshEvent::Update(update)).await.is_err() {
                    log::warn!("update receiver dropped, stopping generation");
                    self.streamer.cancel();
                }
            }
        }

        let session = stream.session();
        let output = stream.output();
        let summary = GenerationSummary {
            asset: self.materialize(&output, asset_path.as_deref()),
            prompt,
            output,
            tokens: session.token_count(),
            elapsed: session.elapsed(),
            tokens_per_second: session.tokens_per_second(),
            cancelled: session.is_cancelled(),
            error,
        };

        log::info!(
            "{:4} tokens generated: {:.2} token/s",
            summary.tokens,
            summary.tokens_per_second
        );

        if let Some(tx) = &events {
            let _ = tx.send(MeshEvent::Done(summary.clone())).await;
        }

        Ok(summary)
    }
}
