//! TLS requirement policy.

use serde::{Deserialize, Serialize};

/// What to do with plaintext requests that match a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsRequirement {
    /// Plaintext is accepted.
    #[default]
    Optional,
    /// Plaintext is refused.
    Required,
    /// Plaintext is redirected to the https equivalent.
    Redirect,
}

impl TlsRequirement {
    pub fn is_enforced(self) -> bool {
        !matches!(self, TlsRequirement::Optional)
    }
}

/// `https://{host}{path}` for a plaintext request, or `None` when the
/// request carried no host to redirect to.
pub fn redirect_location(host: &str, path: &str) -> Option<String> {
    (!host.is_empty()).then(|| format!("https://{host}{path}"))
}
