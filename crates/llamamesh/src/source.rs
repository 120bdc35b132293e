//! Where tokens come from.
//!
//! Inference lives outside this crate. Anything that can turn a formatted
//! prompt into a stream of text fragments can drive a mesh generation.
use std::path::Path;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use shared::llm::GenerationParams;

use crate::error::SourceError;

pub type TokenStream = BoxStream<'static, Result<String, SourceError>>;

pub trait TokenSource: Send + Sync {
    /// Start generating for `prompt`. The returned stream must end after at
    /// most `params.max_tokens` fragments. Dropping it should stop inference.
    fn tokens(&self, prompt: &str, params: &GenerationParams) -> TokenStream;

    /// Whether the model keeps its context between calls. Such a source is
    /// only sent the new turn of a continuation, and should start over when
    /// a prompt begins with `<|begin_of_text|>`.
    fn keeps_context(&self) -> bool {
        false
    }
}

impl<F> TokenSource for F
where
    F: Fn(&str, &GenerationParams) -> TokenStream + Send + Sync,
{
    fn tokens(&self, prompt: &str, params: &GenerationParams) -> TokenStream {
        self(prompt, params)
    }
}

/// Split text into token-like fragments. Whitespace sticks to the word that
/// follows it, so concatenating the fragments gives back the input.
pub fn split_fragments(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut in_word = false;

    for c in text.chars() {
        if c.is_whitespace() && in_word {
            fragments.push(std::mem::take(&mut current));
            in_word = false;
        }

        if !c.is_whitespace() {
            in_word = true;
        }
        current.push(c);
    }

    if !current.is_empty() {
        fragments.push(current);
    }

    fragments
}

/// Replays recorded model output as if it were being generated.
#[derive(Clone, Debug)]
pub struct ReplaySource {
    transcript: String,
    delay: Option<Duration>,
}

impl ReplaySource {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            delay: None,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let transcript =
            std::fs::read_to_string(path).map_err(|err| SourceError::Transcript {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        Ok(Self::new(transcript))
    }

    /// Wait this long before every fragment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = if delay.is_zero() { None } else { Some(delay) };
        self
    }
}

impl TokenSource for ReplaySource {
    fn tokens(&self, prompt: &str, params: &GenerationParams) -> TokenStream {
        log::debug!(
            "replaying transcript for prompt ({} chars), max_tokens={}",
            prompt.len(),
            params.max_tokens
        );

        let fragments: Vec<String> = split_fragments(&self.transcript)
            .into_iter()
            .take(params.max_tokens as usize)
            .collect();

        match self.delay {
            None => stream::iter(fragments.into_iter().map(Ok::<_, SourceError>)).boxed(),
            Some(delay) => stream::iter(fragments)
                .then(move |fragment| async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, SourceError>(fragment)
                })
                .boxed(),
        }
    }
}

/// Display name for a model file: everything before the first `.` of the
/// file name.
pub fn model_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    file_name.split('.').next().map(|name| name.to_string())
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use futures::StreamExt;
    use shared::llm::GenerationParams;

    use super::{model_name, split_fragments, ReplaySource, TokenSource};

    #[test]
    fn test_split_fragments() {
        let fragments = split_fragments("v 0 0 0\nv 1");
        assert_eq!(fragments, vec!["v", " 0", " 0", " 0", "\nv", " 1"]);

        let text = "  ```obj\nv 0.5 -1 2\n```\n";
        assert_eq!(split_fragments(text).concat(), text);
        assert!(split_fragments("").is_empty());
    }

    #[tokio::test]
    async fn test_replay_honors_max_tokens() {
        let source = ReplaySource::new("a b c d e f");
        let params = GenerationParams {
            max_tokens: 3,
            ..Default::default()
        };

        let tokens: Vec<String> = source
            .tokens("prompt", &params)
            .map(|res| res.expect("replay never fails"))
            .collect()
            .await;
        assert_eq!(tokens, vec!["a", " b", " c"]);
    }

    #[tokio::test]
    async fn test_replay_with_delay() {
        let source = ReplaySource::new("x y").with_delay(std::time::Duration::from_millis(1));
        let tokens: Vec<_> = source
            .tokens("prompt", &GenerationParams::default())
            .collect()
            .await;
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_missing_transcript() {
        let res = ReplaySource::from_file(Path::new("/definitely/not/here.txt"));
        assert!(res.is_err());
    }

    #[test]
    fn test_model_name() {
        assert_eq!(
            model_name(Path::new("/models/LLaMA-Mesh.Q4_K_M.gguf")).as_deref(),
            Some("LLaMA-Mesh")
        );
        assert_eq!(model_name(Path::new("mesh")).as_deref(), Some("mesh"));
        assert_eq!(model_name(Path::new("/")), None);
    }
}
