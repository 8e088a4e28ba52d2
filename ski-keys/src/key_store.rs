//! Community-indexed key store
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
use crate::keyring::KeyringSet;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Maps each community to its [`KeyringSet`].
///
/// The map lock is only held long enough to find or insert a set, so work on
/// one community never blocks another.
#[derive(Default)]
pub struct KeyStore {
    by_community: RwLock<HashMap<CommunityId, Arc<KeyringSet>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyrings for a community; never creates them
    pub async fn fetch_keyrings(&self, community_id: &CommunityId) -> SkiResult<Arc<KeyringSet>> {
        let by_community = self.by_community.read().await;
        by_community
            .get(community_id)
            .cloned()
            .ok_or_else(|| SkiError::KeyringNotFound(community_id.to_string()))
    }

    /// Keyrings for a community, created empty on first reference
    pub async fn fetch_or_create_keyrings(&self, community_id: &CommunityId) -> Arc<KeyringSet> {
        if let Ok(existing) = self.fetch_keyrings(community_id).await {
            return existing;
        }

        let mut by_community = self.by_community.write().await;
        by_community
            .entry(community_id.clone())
            .or_insert_with(|| {
                debug!(community_id = %community_id, "Created keyring set");
                Arc::new(KeyringSet::new(community_id.clone()))
            })
            .clone()
    }

    /// Every key held for a community, private bytes included
    pub async fn export_bundle(&self, community_id: &CommunityId) -> SkiResult<KeyBundle> {
        let keyrings = self.fetch_keyrings(community_id).await?;
        Ok(KeyBundle::new(community_id.clone(), keyrings.export_all().await))
    }

    /// Drop all keyrings, zeroizing held private keys
    pub async fn clear(&self) {
        let mut by_community = self.by_community.write().await;
        for keyrings in by_community.values() {
            keyrings.clear().await;
        }
        let communities = by_community.len();
        by_community.clear();
        info!(communities = communities, "Cleared key store");
    }
}
