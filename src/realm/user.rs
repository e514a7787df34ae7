use serde::{Deserialize, Serialize};

/// Identity and credentials of a sync user.
///
/// The permission layer only reads the identity (cache key, record owner) and
/// the server URL (to locate the hidden realms); everything else is handed to
/// the caller's config maker untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncUser {
    identity: String,
    server_url: String,
    refresh_token: String,
}

impl SyncUser {
    pub fn new(
        identity: impl Into<String>,
        server_url: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            server_url: server_url.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}
