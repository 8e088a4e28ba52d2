//! File-backed vault provider
//!
//! Layout under `<base_dir>/<identity>/`:
//! - `vault.salt`: random salt for master key derivation
//! - `vault.check`: encrypted marker proving the credential
//! - `community-<hex>.keys`: one encrypted key bundle per community
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
use crate::kit::CryptoKit;
use crate::kits::{random_bytes, AesGcmKit, KEY_LEN};
use crate::provider::{Provider, SessionParams};
use crate::vault::{KeyVault, VaultClaim, VaultClaims};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

pub const FILE_INVOCATION: &str = "fs";

const SALT_FILE: &str = "vault.salt";
const CHECK_FILE: &str = "vault.check";
const SALT_LEN: usize = 16;
const CHECK_MARKER: &[u8] = b"ski-vault-check-v1";
const BUNDLE_PREFIX: &str = "community-";
const BUNDLE_EXT: &str = "keys";

/// Master key for encrypting stored bundles
type MasterKey = Zeroizing<[u8; KEY_LEN]>;

/// Stores each identity's keys as AES-256-GCM encrypted files.
///
/// An identity directory is held by at most one open vault at a time.
pub struct FileProvider {
    base_dir: PathBuf,
    claims: VaultClaims,
}

impl FileProvider {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            claims: VaultClaims::new(),
        }
    }

    /// Map an identity onto a single safe path component
    fn identity_dir(base_dir: &Path, identity: &str) -> PathBuf {
        let mut sanitized: String = identity
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '@' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized.starts_with('.') {
            sanitized.insert(0, '_');
        }
        base_dir.join(sanitized)
    }

    async fn load_or_create_salt(dir: &Path) -> SkiResult<Vec<u8>> {
        let path = dir.join(SALT_FILE);
        match fs::read(&path).await {
            Ok(salt) => Ok(salt),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let salt = random_bytes::<SALT_LEN>().to_vec();
                fs::write(&path, &salt).await?;
                Ok(salt)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn derive_master_key(salt: &[u8], credential: &[u8]) -> MasterKey {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(credential);
        Zeroizing::new(hasher.finalize().into())
    }
}

#[async_trait]
impl Provider for FileProvider {
    fn invocation(&self) -> &str {
        FILE_INVOCATION
    }

    async fn open_vault(&self, params: &SessionParams) -> SkiResult<Arc<dyn KeyVault>> {
        if params.identity.is_empty() {
            return Err(SkiError::AuthenticationFailed("empty identity".to_string()));
        }

        let base_dir = params.base_dir.as_deref().unwrap_or(self.base_dir.as_path());
        let dir = Self::identity_dir(base_dir, &params.identity);
        let claim = self.claims.claim(&dir.to_string_lossy())?;
        fs::create_dir_all(&dir).await?;

        let salt = Self::load_or_create_salt(&dir).await?;
        let master_key = Self::derive_master_key(&salt, &params.credential);

        let check_path = dir.join(CHECK_FILE);
        match fs::read(&check_path).await {
            Ok(sealed) => {
                let marker = AesGcmKit.decrypt(master_key.as_slice(), &sealed).map_err(|_| {
                    SkiError::AuthenticationFailed(format!(
                        "credential rejected for {}",
                        params.identity
                    ))
                })?;
                if marker != CHECK_MARKER {
                    return Err(SkiError::AuthenticationFailed(format!(
                        "corrupt vault check for {}",
                        params.identity
                    )));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let sealed = AesGcmKit.encrypt(master_key.as_slice(), CHECK_MARKER)?;
                fs::write(&check_path, sealed).await?;
                info!(identity = %params.identity, path = %dir.display(), "Created file vault");
            }
            Err(e) => return Err(e.into()),
        }

        debug!(identity = %params.identity, "Opened file vault");
        Ok(Arc::new(FileVault {
            identity: params.identity.clone(),
            dir,
            master_key,
            claim: Mutex::new(Some(claim)),
        }) as Arc<dyn KeyVault>)
    }
}

pub struct FileVault {
    identity: String,
    dir: PathBuf,
    master_key: MasterKey,
    claim: Mutex<Option<VaultClaim>>,
}

impl FileVault {
    /// Get path for a community's bundle file
    fn bundle_path(&self, bundle: &KeyBundle) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            BUNDLE_PREFIX, bundle.community_id, BUNDLE_EXT
        ))
    }

    fn is_bundle_file(path: &Path) -> bool {
        let is_keys = path.extension().map(|ext| ext == BUNDLE_EXT).unwrap_or(false);
        let named = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(BUNDLE_PREFIX))
            .unwrap_or(false);
        is_keys && named
    }
}

#[async_trait]
impl KeyVault for FileVault {
    async fn load_bundles(&self) -> SkiResult<Vec<KeyBundle>> {
        let mut bundles = Vec::new();

        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !Self::is_bundle_file(&path) {
                continue;
            }

            let sealed = fs::read(&path).await?;
            let plain = Zeroizing::new(AesGcmKit.decrypt(self.master_key.as_slice(), &sealed).map_err(
                |e| {
                    warn!(path = %path.display(), error = %e, "Failed to decrypt key bundle");
                    e
                },
            )?);
            bundles.push(KeyBundle::from_bytes(&plain)?);
        }

        debug!(identity = %self.identity, bundles = bundles.len(), "Loaded key bundles");
        Ok(bundles)
    }

    async fn store_bundle(&self, bundle: &KeyBundle) -> SkiResult<()> {
        let plain = Zeroizing::new(bundle.to_bytes()?);
        let sealed = AesGcmKit.encrypt(self.master_key.as_slice(), &plain)?;

        let path = self.bundle_path(bundle);
        let tmp_path = path.with_extension(format!("{}.tmp", BUNDLE_EXT));
        fs::write(&tmp_path, &sealed).await?;
        fs::rename(&tmp_path, &path).await?;

        debug!(
            identity = %self.identity,
            community_id = %bundle.community_id,
            keys = bundle.keys.len(),
            "Stored key bundle"
        );
        Ok(())
    }

    async fn close(&self) -> SkiResult<()> {
        self.claim.lock().unwrap_or_else(|e| e.into_inner()).take();
        debug!(identity = %self.identity, "Closed file vault");
        Ok(())
    }
}
