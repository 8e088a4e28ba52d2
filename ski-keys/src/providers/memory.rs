//! In-process vault provider
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
use crate::key_types::{CommunityId, KeyBundle};
use crate::provider::{Provider, SessionParams};
use crate::vault::{KeyVault, VaultClaim, VaultClaims};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

pub const MEMORY_INVOCATION: &str = "mem";

/// Keeps vaults in process memory, one per identity.
///
/// The first session for an identity fixes its credential; keys survive
/// across sessions until the provider is dropped. Only one vault handle per
/// identity may be open at a time.
#[derive(Default)]
pub struct MemoryProvider {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
    claims: VaultClaims,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

fn credential_digest(credential: &[u8]) -> [u8; 32] {
    Sha256::digest(credential).into()
}

#[async_trait]
impl Provider for MemoryProvider {
    fn invocation(&self) -> &str {
        MEMORY_INVOCATION
    }

    async fn open_vault(&self, params: &SessionParams) -> SkiResult<Arc<dyn KeyVault>> {
        if params.identity.is_empty() {
            return Err(SkiError::AuthenticationFailed("empty identity".to_string()));
        }

        let digest = credential_digest(&params.credential);
        let mut stores = self.stores.lock().await;

        let store = match stores.get(&params.identity) {
            Some(existing) => {
                if existing.credential_digest != digest {
                    return Err(SkiError::AuthenticationFailed(format!(
                        "credential mismatch for {}",
                        params.identity
                    )));
                }
                existing.clone()
            }
            None => {
                info!(identity = %params.identity, "Created in-memory vault");
                let store = Arc::new(MemoryStore {
                    credential_digest: digest,
                    bundles: RwLock::new(HashMap::new()),
                });
                stores.insert(params.identity.clone(), store.clone());
                store
            }
        };
        let claim = self.claims.claim(&params.identity)?;

        Ok(Arc::new(MemoryVault {
            identity: params.identity.clone(),
            store,
            claim: StdMutex::new(Some(claim)),
        }) as Arc<dyn KeyVault>)
    }
}

/// Bundles kept for one identity across sessions
struct MemoryStore {
    credential_digest: [u8; 32],
    bundles: RwLock<HashMap<CommunityId, KeyBundle>>,
}

/// One session's handle onto an identity's [`MemoryStore`]
pub struct MemoryVault {
    identity: String,
    store: Arc<MemoryStore>,
    claim: StdMutex<Option<VaultClaim>>,
}

#[async_trait]
impl KeyVault for MemoryVault {
    async fn load_bundles(&self) -> SkiResult<Vec<KeyBundle>> {
        let bundles = self.store.bundles.read().await;
        Ok(bundles.values().cloned().collect())
    }

    async fn store_bundle(&self, bundle: &KeyBundle) -> SkiResult<()> {
        let mut bundles = self.store.bundles.write().await;
        bundles.insert(bundle.community_id.clone(), bundle.clone());
        debug!(
            identity = %self.identity,
            community_id = %bundle.community_id,
            keys = bundle.keys.len(),
            "Stored key bundle in memory"
        );
        Ok(())
    }

    async fn close(&self) -> SkiResult<()> {
        self.claim.lock().unwrap_or_else(|e| e.into_inner()).take();
        debug!(identity = %self.identity, "Closed in-memory vault");
        Ok(())
    }
}
