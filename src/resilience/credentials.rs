//! Bearer credential storage.

use std::sync::RwLock;

/// Where the client reads and clears its bearer token.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: String);
    fn clear(&self);
}

/// In-process token holder.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<String>>,
}

impl MemoryCredentials {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentials {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .expect("credential lock poisoned")
            .clone()
            .filter(|t| !t.is_empty())
    }

    fn set_token(&self, token: String) {
        *self.token.write().expect("credential lock poisoned") = Some(token);
    }

    fn clear(&self) {
        *self.token.write().expect("credential lock poisoned") = None;
    }
}
