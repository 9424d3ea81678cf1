//! Bearer credential supply for the connection handshake.

/// Source of the opaque bearer token presented when connecting.
pub trait CredentialProvider: Send + Sync + 'static {
    /// `None` (or an empty token) means the client may not connect.
    fn token(&self) -> Option<String>;
}

/// A fixed token, typically read from configuration.
#[derive(Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CredentialProvider for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.token.clone().filter(|t| !t.trim().is_empty())
    }
}
