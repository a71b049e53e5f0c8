//! Wire format types for each supported vendor protocol

pub mod anthropic;
pub mod gemini;
pub mod normalized;
pub mod openai;
pub mod workflow;
