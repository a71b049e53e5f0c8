//! Types shared by every chorus crate

#![allow(clippy::must_use_candidate)]

mod credentials;
mod error;

pub use credentials::ProviderCredentials;
pub use error::HttpError;
