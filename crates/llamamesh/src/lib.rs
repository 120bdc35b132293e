//! Streams mesh-generating model output into OBJ meshes.
//!
//! Tokens come from a [`TokenSource`], get accumulated into snapshots by
//! [`MeshStreamer`], and every snapshot can be turned into mesh text,
//! statistics and, once the text parses, a [`MeshAsset`].
pub mod asset;
pub mod error;
pub mod generator;
pub mod output;
pub mod prompt;
pub mod source;
pub mod stream;
pub mod throughput;

pub use asset::MeshAsset;
pub use error::{AssetError, GenerateError, SourceError, StreamError};
pub use generator::{GenerationSummary, MeshEvent, MeshGenerator, MeshUpdate};
pub use output::{extract_mesh, extract_obj, MeshOutput};
pub use prompt::Prompt;
pub use source::{ReplaySource, TokenSource, TokenStream};
pub use stream::{CancelHandle, MeshStream, MeshStreamer};
pub use throughput::{tokens_per_second, GenerationSession};
