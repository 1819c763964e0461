//! Shared User-Agent string for provider HTTP clients.
//!
//! Every adapter sends the same UA so provider traffic is not fingerprintable
//! per adapter.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/third-api";

/// Default User-Agent for provider requests.
#[must_use]
pub(crate) fn default_provider_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("third-api/{version} (media-resolver; +{PROJECT_UA_URL})")
}
