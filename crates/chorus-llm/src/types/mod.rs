//! Normalized request, response, and delta types

mod delta;
mod message;
mod request;
mod response;

pub use delta::{Delta, Usage};
pub use message::{Message, Role};
pub use request::{Attachment, AttachmentKind, CompletionParams, CompletionRequest, TransferMethod};
pub use response::{Choice, ChoiceMessage, CompletionResponse};
