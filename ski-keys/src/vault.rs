//! Vault interface: the provider-specific secure handle behind a session
//!
//! A vault persists the key bundles of one identity. Backends:
//! - In-process memory (`mem`)
//! - Encrypted files on local disk (`fs`)
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::{SkiError, SkiResult};
use crate::key_types::KeyBundle;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Trait for session storage backends
#[async_trait]
pub trait KeyVault: Send + Sync {
    /// Load every stored community bundle, private bytes included
    async fn load_bundles(&self) -> SkiResult<Vec<KeyBundle>>;

    /// Replace the stored bundle for `bundle.community_id`
    async fn store_bundle(&self, bundle: &KeyBundle) -> SkiResult<()>;

    /// Release the handle; called once when the owning session ends
    async fn close(&self) -> SkiResult<()>;
}

/// Identities with an open vault on one provider.
///
/// A vault holds its identity's claim until `close` or drop, so at most one
/// session at a time can write an identity's bundles.
#[derive(Default, Clone)]
pub struct VaultClaims {
    held: Arc<Mutex<HashSet<String>>>,
}

impl VaultClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `identity`, failing with `IdentityInUse` while another claim is held
    pub fn claim(&self, identity: &str) -> SkiResult<VaultClaim> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(identity.to_string()) {
            return Err(SkiError::IdentityInUse(identity.to_string()));
        }
        Ok(VaultClaim {
            identity: identity.to_string(),
            held: self.held.clone(),
        })
    }
}

/// Releases its identity when dropped
pub struct VaultClaim {
    identity: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for VaultClaim {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.identity);
        debug!(identity = %self.identity, "Released vault claim");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let claims = VaultClaims::new();
        let first = claims.claim("alice").unwrap();
        assert!(matches!(claims.claim("alice"), Err(SkiError::IdentityInUse(_))));
        assert!(claims.claim("bob").is_ok());

        drop(first);
        assert!(claims.claim("alice").is_ok());
    }
}
