// Credential Vault Port

use crate::domain::{Credential, CredentialId};
use crate::error::Result;
use async_trait::async_trait;

/// Returns decrypted connection parameters by credential ID
///
/// Implementations decrypt on every call and keep no plaintext cache.
#[async_trait]
pub trait CredentialVault: Send + Sync {
    async fn decrypt(&self, id: CredentialId) -> Result<Option<Credential>>;
}

pub mod mocks {
    use super::*;
    use crate::domain::CredentialKind;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Vault over plaintext parameter maps, parsed fresh per call
    #[derive(Default)]
    pub struct MemoryVault {
        records: Mutex<HashMap<CredentialId, (CredentialKind, Value)>>,
        decrypt_calls: AtomicUsize,
    }

    impl MemoryVault {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, id: CredentialId, kind: CredentialKind, params: Value) {
            self.records.lock().unwrap().insert(id, (kind, params));
        }

        pub fn with(self, id: CredentialId, kind: CredentialKind, params: Value) -> Self {
            self.insert(id, kind, params);
            self
        }

        pub fn decrypt_calls(&self) -> usize {
            self.decrypt_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialVault for MemoryVault {
        async fn decrypt(&self, id: CredentialId) -> Result<Option<Credential>> {
            self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
            let record = self.records.lock().unwrap().get(&id).cloned();
            match record {
                Some((kind, params)) => Ok(Some(Credential::from_plaintext(
                    id,
                    format!("credential-{}", id),
                    1,
                    kind,
                    &params,
                )?)),
                None => Ok(None),
            }
        }
    }
}
