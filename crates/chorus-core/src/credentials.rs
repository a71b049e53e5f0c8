use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

/// Credential bundle forwarded to a vendor on behalf of the caller
///
/// The key is only exposed when an adapter builds its outbound headers.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderCredentials {
    /// Vendor API key
    #[serde(default = "empty_secret")]
    pub api_key: SecretString,
    /// Endpoint override for the provider's default base URL
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Organization identifier (OpenAI-compatible vendors only)
    #[serde(default)]
    pub organization_id: Option<String>,
}

impl ProviderCredentials {
    /// Credentials consisting of just an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: None,
            organization_id: None,
        }
    }

    /// Override the provider's default endpoint
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Attach an organization identifier
    #[must_use]
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Whether the bundle carries a key worth sending upstream
    pub fn has_usable_key(&self) -> bool {
        !self.api_key.expose_secret().trim().is_empty()
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}
