//! Vendor adapters and the normalized delta protocol for chorus
//!
//! Hides four vendor wire protocols (`OpenAI`-compatible, Anthropic, Gemini,
//! and workflow-style apps) behind one `data: {choices:[{delta}]}` frame
//! shape, parses that shape into typed deltas, and relays completion
//! requests either in-process or over HTTP.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod convert;
pub mod error;
#[cfg(feature = "http")]
pub mod handler;
pub mod parser;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod relay;
pub mod types;

pub use error::LlmError;
#[cfg(feature = "http")]
pub use handler::relay_router;
pub use parser::{DeltaStream, FrameError};
pub use provider::workflow::{FileUpload, UploadedFile};
pub use provider::{Adapter, ByteStream, Completion, VendorAdapter};
pub use registry::{ModelDescriptor, ProtocolVariant, ProviderDefinition, Registry};
pub use relay::{Relay, RelayCredentials, RelayRequest};
pub use types::{Attachment, CompletionRequest, CompletionResponse, Delta, Message, Role, Usage};
