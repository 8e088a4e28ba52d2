//! Process-wide registry of crypto kits and providers
//!
//! Built once at startup, then shared read-only as `Arc<SkiRegistry>`.
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
use crate::key_types::CryptoKitId;
use crate::kit::{CryptoKit, CryptoKitRegistry};
use crate::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct SkiRegistry {
    kits: CryptoKitRegistry,
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl SkiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_crypto_kit(&mut self, kit: Arc<dyn CryptoKit>) -> SkiResult<()> {
        self.kits.register(kit)
    }

    pub fn register_provider(&mut self, provider: Arc<dyn Provider>) -> SkiResult<()> {
        let invocation = provider.invocation().to_string();
        if self.providers.contains_key(&invocation) {
            return Err(SkiError::ProviderAlreadyRegistered(invocation));
        }
        info!(invocation = %invocation, "Registered provider");
        self.providers.insert(invocation, provider);
        Ok(())
    }

    pub fn kits(&self) -> &CryptoKitRegistry {
        &self.kits
    }

    pub fn crypto_kit(&self, id: CryptoKitId) -> SkiResult<Arc<dyn CryptoKit>> {
        self.kits.lookup(id)
    }

    pub fn provider(&self, invocation: &str) -> SkiResult<Arc<dyn Provider>> {
        self.providers
            .get(invocation)
            .cloned()
            .ok_or_else(|| SkiError::ProviderNotFound(invocation.to_string()))
    }

    pub fn invocations(&self) -> Vec<String> {
        let mut invocations: Vec<_> = self.providers.keys().cloned().collect();
        invocations.sort();
        invocations
    }
}
