//! Inference backend boundary for ragline.
//!
//! This crate tracks which models are warm behind an LM Studio / llama-server
//! style backend, evicts idle ones, and delivers chat requests through an
//! ordered chain of transports (native API first, OpenAI-compatible REST
//! second).

mod client;
mod error;
pub mod reaper;
mod registry;
pub mod stream;
mod transport;

use std::time::Duration;

pub use client::{BackendClient, BackendModel, ChatMessage, ChatRequest, Role};
pub use error::BackendError;
pub use reaper::{sweep, TtlReaper, DEFAULT_REAPER_INTERVAL};
pub use registry::{ModelEntry, ModelHandle, ModelRegistry};
pub use stream::ChatStream;
pub use transport::{
    AnswerTransport, NativeTransport, RestTransport, SendOutcome, TransportChain,
    DEFAULT_CHUNK_TIMEOUT,
};

/// Default backend URL (LM Studio's local server).
pub const DEFAULT_HOST: &str = "http://localhost:1234";

/// Port used when the backend URL does not name one.
pub const DEFAULT_PORT: u16 = 1234;

/// Timeout for model listing and capability probes.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(5);
