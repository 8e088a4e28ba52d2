//! Per-community keyrings
//!
//! A [`KeyringSet`] holds one keyring per [`KeyDomain`] for a single community.
//! All domains share one reader/writer lock; merges and generation take it
//! exclusively once per batch.
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
use crate::key_types::{CommunityId, KeyDomain, KeyEntry, KeyId, KeyRef, NUM_KEY_DOMAINS};
use crate::kit::CryptoKitRegistry;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Default)]
struct Keyring {
    keys_by_id: HashMap<KeyId, KeyEntry>,
}

/// Keyrings of one community, indexed by key domain
pub struct KeyringSet {
    community_id: CommunityId,
    by_key_domain: RwLock<[Keyring; NUM_KEY_DOMAINS]>,
}

impl KeyringSet {
    pub fn new(community_id: CommunityId) -> Self {
        Self {
            community_id,
            by_key_domain: RwLock::new(Default::default()),
        }
    }

    pub fn community_id(&self) -> &CommunityId {
        &self.community_id
    }

    /// Merge entries, returning those that could not be merged.
    ///
    /// An entry whose KeyID is already present merges only if it is identical
    /// to the held entry; existing entries are never overwritten. Entries
    /// without public material are never merged. Every domain is validated
    /// before anything is inserted.
    pub async fn merge_keys(&self, entries: Vec<KeyEntry>) -> SkiResult<Vec<KeyEntry>> {
        for entry in &entries {
            entry.domain()?;
        }

        let total = entries.len();
        let mut not_merged = Vec::new();

        let mut keyrings = self.by_key_domain.write().await;
        for entry in entries {
            let domain = entry.domain()?;
            if entry.pub_key.is_empty() {
                not_merged.push(entry);
                continue;
            }

            match keyrings[domain.index()].keys_by_id.entry(entry.key_id()) {
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
                Entry::Occupied(existing) => {
                    if existing.get() != &entry {
                        not_merged.push(entry);
                    }
                }
            }
        }
        drop(keyrings);

        if !not_merged.is_empty() {
            warn!(
                community_id = %self.community_id,
                rejected = not_merged.len(),
                total = total,
                "Key merge rejected colliding entries"
            );
        } else {
            debug!(community_id = %self.community_id, total = total, "Merged keys");
        }

        Ok(not_merged)
    }

    /// Generate and insert fresh keys for each request.
    ///
    /// A KeyID collision (against held keys or within the batch) discards the
    /// whole batch and regenerates it, up to `max_attempts` times.
    pub async fn generate_new_keys(
        &self,
        kits: &CryptoKitRegistry,
        key_reqs: &[KeyEntry],
        max_attempts: u32,
    ) -> SkiResult<Vec<KeyEntry>> {
        let domains = key_reqs
            .iter()
            .map(KeyEntry::domain)
            .collect::<SkiResult<Vec<_>>>()?;

        let mut keyrings = self.by_key_domain.write().await;

        for attempt in 1..=max_attempts {
            let new_keys = key_reqs
                .iter()
                .map(|req| kits.generate_key_entry(req))
                .collect::<SkiResult<Vec<_>>>()?;

            let mut seen = HashSet::with_capacity(new_keys.len());
            let collided = new_keys.iter().zip(&domains).any(|(key, domain)| {
                let key_id = key.key_id();
                !seen.insert((domain.index(), key_id))
                    || keyrings[domain.index()].keys_by_id.contains_key(&key_id)
            });

            if !collided {
                for (key, domain) in new_keys.iter().zip(&domains) {
                    keyrings[domain.index()]
                        .keys_by_id
                        .insert(key.key_id(), key.clone());
                }
                debug!(
                    community_id = %self.community_id,
                    count = new_keys.len(),
                    attempt = attempt,
                    "Generated new keys"
                );
                return Ok(new_keys);
            }

            warn!(
                community_id = %self.community_id,
                attempt = attempt,
                max_attempts = max_attempts,
                "KeyID collision during key generation, regenerating"
            );
        }

        Err(SkiError::KeyGenCollision(max_attempts))
    }

    /// Remove exactly these entries; held keys that differ are left alone
    pub async fn remove_keys(&self, entries: &[KeyEntry]) -> SkiResult<usize> {
        let mut keyrings = self.by_key_domain.write().await;
        let mut removed = 0;
        for entry in entries {
            let keyring = &mut keyrings[entry.domain()?.index()];
            if let Entry::Occupied(held) = keyring.keys_by_id.entry(entry.key_id()) {
                if held.get() == entry {
                    held.remove();
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Look up keys by reference. Each element of the result corresponds to
    /// the reference at the same position; missing keys are `None` unless
    /// `error_on_not_found` is set, in which case the whole call fails.
    pub async fn export_named_keys(
        &self,
        key_refs: &[KeyRef],
        error_on_not_found: bool,
    ) -> SkiResult<Vec<Option<KeyEntry>>> {
        let domains = key_refs
            .iter()
            .map(KeyRef::domain)
            .collect::<SkiResult<Vec<_>>>()?;

        let keyrings = self.by_key_domain.read().await;

        let mut out = Vec::with_capacity(key_refs.len());
        for (key_ref, domain) in key_refs.iter().zip(domains) {
            let key_id = key_ref.key_id();
            let found = keyrings[domain.index()].keys_by_id.get(&key_id).cloned();
            if found.is_none() && error_on_not_found {
                return Err(SkiError::KeyIdNotFound(key_id.to_string()));
            }
            out.push(found);
        }

        Ok(out)
    }

    /// Snapshot of every key in one domain. Order is unspecified.
    pub async fn export_keyring(&self, domain: i32) -> SkiResult<Vec<KeyEntry>> {
        let domain = KeyDomain::try_from(domain)?;
        let keyrings = self.by_key_domain.read().await;
        Ok(keyrings[domain.index()].keys_by_id.values().cloned().collect())
    }

    /// Snapshot of every key in every domain
    pub async fn export_all(&self) -> Vec<KeyEntry> {
        let keyrings = self.by_key_domain.read().await;
        keyrings
            .iter()
            .flat_map(|keyring| keyring.keys_by_id.values().cloned())
            .collect()
    }

    pub async fn key_count(&self) -> usize {
        let keyrings = self.by_key_domain.read().await;
        keyrings.iter().map(|keyring| keyring.keys_by_id.len()).sum()
    }

    /// Drop every held key; private bytes are zeroized as entries drop
    pub async fn clear(&self) {
        let mut keyrings = self.by_key_domain.write().await;
        for keyring in keyrings.iter_mut() {
            keyring.keys_by_id.clear();
        }
    }
}
