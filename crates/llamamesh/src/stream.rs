use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::stream::{FusedStream, Stream, StreamExt};
use futures::ready;
use shared::llm::GenerationParams;

use crate::error::StreamError;
use crate::output::MeshOutput;
use crate::source::{TokenSource, TokenStream};
use crate::throughput::GenerationSession;

/// Cooperative stop flag, checked once per token.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Starts streaming sessions and can stop the one in flight.
///
/// Every session gets its own cancel flag, so cancelling one never touches
/// the sessions started after it.
#[derive(Clone, Debug, Default)]
pub struct MeshStreamer {
    current: Arc<Mutex<CancelHandle>>,
}

impl MeshStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask `source` to generate for `prompt` and accumulate what it produces.
    ///
    /// Callers are expected to run one session at a time per streamer.
    pub fn stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
        source: &dyn TokenSource,
    ) -> MeshStream {
        log::debug!(
            "starting stream: max_tokens={}, temperature={}, seed={}",
            params.max_tokens,
            params.temperature,
            params.seed
        );

        let cancel = CancelHandle::default();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        MeshStream::new(source.tokens(prompt, params), cancel)
    }

    /// Stop the most recently started session. A session that already ended
    /// ignores it.
    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    /// Cancel flag of the most recently started session.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Yields one [`MeshOutput`] per token, in arrival order.
///
/// Tokens are only requested from the source when the consumer polls, so a
/// slow consumer slows the source down instead of losing snapshots. Once
/// cancelled the stream ends normally at the next token boundary. A source
/// error is yielded once and ends the stream.
pub struct MeshStream {
    tokens: Option<TokenStream>,
    buffer: String,
    session: GenerationSession,
}

impl MeshStream {
    pub fn new(tokens: TokenStream, cancel: CancelHandle) -> Self {
        Self {
            tokens: Some(tokens),
            buffer: String::new(),
            session: GenerationSession::start(cancel),
        }
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    /// Everything received so far, including a token that arrived after
    /// cancellation.
    pub fn raw(&self) -> &str {
        &self.buffer
    }

    pub fn output(&self) -> MeshOutput {
        MeshOutput::new(self.buffer.as_str())
    }

    fn finish(&mut self, reason: &str) {
        // Dropping the source lets it stop generating.
        self.tokens = None;
        self.session.finish();
        log::debug!(
            "stream {reason} after {} tokens ({:.2} token/s)",
            self.session.token_count(),
            self.session.tokens_per_second()
        );
    }
}

impl Stream for MeshStream {
    type Item = Result<MeshOutput, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.tokens.is_some() && this.session.is_cancelled() {
            this.finish("cancelled");
        }

        let Some(tokens) = this.tokens.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(tokens.poll_next_unpin(cx)) {
            Some(Ok(token)) => {
                this.session.record_token();
                this.buffer.push_str(&token);

                // Cancelled while we were waiting: keep the token, skip the
                // snapshot.
                if this.session.is_cancelled() {
                    this.finish("cancelled");
                    return Poll::Ready(None);
                }

                Poll::Ready(Some(Ok(MeshOutput::new(this.buffer.as_str()))))
            }
            Some(Err(source)) => {
                let tokens = this.session.token_count();
                this.finish("failed");
                log::error!("token source failed: {source}");
                Poll::Ready(Some(Err(StreamError::Source { tokens, source })))
            }
            None => {
                this.finish("done");
                Poll::Ready(None)
            }
        }
    }
}

impl FusedStream for MeshStream {
    fn is_terminated(&self) -> bool {
        self.tokens.is_none()
    }
}
