//! Providers open authenticated vaults for sessions
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


use crate::error::SkiResult;
use crate::key_types::CommunityId;
use crate::vault::KeyVault;
use async_trait::async_trait;
use ski_config::DEFAULT_KEYGEN_MAX_ATTEMPTS;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Everything needed to start a session
#[derive(Clone)]
pub struct SessionParams {
    /// Provider invocation string, e.g. `"fs"` or `"mem"`
    pub invocation: String,
    pub identity: String,
    /// Community the session acts for; its keyrings always exist while open
    pub community_id: CommunityId,
    pub credential: Zeroizing<Vec<u8>>,
    /// Overrides the provider's default storage location
    pub base_dir: Option<PathBuf>,
    pub keygen_max_attempts: u32,
}

impl SessionParams {
    pub fn new(
        invocation: impl Into<String>,
        identity: impl Into<String>,
        community_id: CommunityId,
        credential: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            invocation: invocation.into(),
            identity: identity.into(),
            community_id,
            credential: Zeroizing::new(credential.into()),
            base_dir: None,
            keygen_max_attempts: DEFAULT_KEYGEN_MAX_ATTEMPTS,
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn with_keygen_max_attempts(mut self, max_attempts: u32) -> Self {
        self.keygen_max_attempts = max_attempts;
        self
    }
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("invocation", &self.invocation)
            .field("identity", &self.identity)
            .field("community_id", &self.community_id)
            .field("credential", &"<redacted>")
            .field("base_dir", &self.base_dir)
            .field("keygen_max_attempts", &self.keygen_max_attempts)
            .finish()
    }
}

/// Factory for session vaults backed by one storage mechanism
#[async_trait]
pub trait Provider: Send + Sync {
    /// Invocation string the provider is registered under
    fn invocation(&self) -> &str;

    /// Authenticate `params.credential` for `params.identity` and open its vault.
    ///
    /// Fails with `AuthenticationFailed` on a bad credential.
    async fn open_vault(&self, params: &SessionParams) -> SkiResult<Arc<dyn KeyVault>>;
}
