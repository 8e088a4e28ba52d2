//! Crypto kit interface and registry
//!
//! A crypto kit is a stateless algorithm suite addressed by a [`CryptoKitId`].
//! Kits are registered once at startup and then shared by every session.
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
use crate::key_types::{CryptoKitId, KeyEntry, KeyType};
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Algorithm suite for key generation, signing and encryption
pub trait CryptoKit: Send + Sync {
    fn id(&self) -> CryptoKitId;

    fn name(&self) -> &'static str;

    /// Generate fresh key material, returned as `(pub_key, priv_key)`
    fn generate_key(&self, key_type: KeyType) -> SkiResult<(Vec<u8>, Vec<u8>)>;

    /// Sign `msg` with a signing private key
    fn sign(&self, _priv_key: &[u8], _msg: &[u8]) -> SkiResult<Vec<u8>> {
        Err(SkiError::UnsupportedKeyType(format!("{} cannot sign", self.name())))
    }

    /// Check `signature` over `msg` against a signing public key
    fn verify(&self, _signature: &[u8], _msg: &[u8], _pub_key: &[u8]) -> SkiResult<()> {
        Err(SkiError::UnsupportedKeyType(format!("{} cannot verify", self.name())))
    }

    /// Encrypt with a symmetric key
    fn encrypt(&self, sym_key: &[u8], msg: &[u8]) -> SkiResult<Vec<u8>>;

    /// Decrypt a buffer produced by [`CryptoKit::encrypt`]
    fn decrypt(&self, sym_key: &[u8], buf: &[u8]) -> SkiResult<Vec<u8>>;

    /// Encrypt so that only the holder of `recipient_pub_key`'s private half can read it
    fn encrypt_for(&self, _recipient_pub_key: &[u8], _msg: &[u8]) -> SkiResult<Vec<u8>> {
        Err(SkiError::UnsupportedKeyType(format!(
            "{} has no asymmetric encryption",
            self.name()
        )))
    }

    /// Decrypt a buffer produced by [`CryptoKit::encrypt_for`]
    fn decrypt_from(&self, _priv_key: &[u8], _buf: &[u8]) -> SkiResult<Vec<u8>> {
        Err(SkiError::UnsupportedKeyType(format!(
            "{} has no asymmetric encryption",
            self.name()
        )))
    }
}

/// Content hash algorithms used when packing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKitId {
    Sha256,
    Sha512,
}

impl HashKitId {
    /// Wire code
    pub fn code(self) -> u64 {
        match self {
            HashKitId::Sha256 => 1,
            HashKitId::Sha512 => 2,
        }
    }

    pub fn from_code(code: u64) -> SkiResult<Self> {
        match code {
            1 => Ok(HashKitId::Sha256),
            2 => Ok(HashKitId::Sha512),
            other => Err(SkiError::DecodeFailed(format!("Unknown hash kit: {}", other))),
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashKitId::Sha256 => Sha256::digest(data).to_vec(),
            HashKitId::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Set of available crypto kits
#[derive(Default)]
pub struct CryptoKitRegistry {
    kits: HashMap<CryptoKitId, Arc<dyn CryptoKit>>,
}

impl CryptoKitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kit; each ID may only be registered once
    pub fn register(&mut self, kit: Arc<dyn CryptoKit>) -> SkiResult<()> {
        let id = kit.id();
        if self.kits.contains_key(&id) {
            return Err(SkiError::KitAlreadyRegistered(id.0));
        }
        debug!(kit_id = %id, kit = kit.name(), "Registered crypto kit");
        self.kits.insert(id, kit);
        Ok(())
    }

    pub fn lookup(&self, id: CryptoKitId) -> SkiResult<Arc<dyn CryptoKit>> {
        self.kits
            .get(&id)
            .cloned()
            .ok_or(SkiError::KitNotFound(id.0))
    }

    /// Produce a new key for a key request (a [`KeyEntry`] without key bytes)
    pub fn generate_key_entry(&self, request: &KeyEntry) -> SkiResult<KeyEntry> {
        let kit = self.lookup(request.crypto_kit)?;
        let (pub_key, priv_key) = kit.generate_key(request.key_type)?;

        Ok(KeyEntry {
            key_type: request.key_type,
            key_domain: request.key_domain,
            crypto_kit: request.crypto_kit,
            pub_key,
            priv_key,
            created_at: chrono::Utc::now().timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_types::KeyDomain;
    use crate::kits::{AesGcmKit, DalekKit};

    #[test]
    fn test_register_rejects_duplicate_id() {
        let mut registry = CryptoKitRegistry::new();
        registry.register(Arc::new(DalekKit)).unwrap();
        registry.register(Arc::new(AesGcmKit)).unwrap();

        let result = registry.register(Arc::new(DalekKit));
        assert!(matches!(result, Err(SkiError::KitAlreadyRegistered(1))));
        assert_eq!(registry.lookup(CryptoKitId::DALEK).unwrap().name(), DalekKit.name());
    }

    #[test]
    fn test_lookup_missing_kit() {
        let registry = CryptoKitRegistry::new();
        assert!(matches!(
            registry.lookup(CryptoKitId(99)),
            Err(SkiError::KitNotFound(99))
        ));
    }

    #[test]
    fn test_generate_key_entry_fills_material() {
        let mut registry = CryptoKitRegistry::new();
        registry.register(Arc::new(DalekKit)).unwrap();

        let request = KeyEntry::request(KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK);
        let entry = registry.generate_key_entry(&request).unwrap();

        assert_eq!(entry.key_type, KeyType::Signing);
        assert_eq!(entry.key_domain, request.key_domain);
        assert_eq!(entry.pub_key.len(), 32);
        assert!(entry.has_private_key());
        assert!(entry.created_at > 0);
    }

    #[test]
    fn test_hash_kit_codes() {
        for kit in [HashKitId::Sha256, HashKitId::Sha512] {
            assert_eq!(HashKitId::from_code(kit.code()).unwrap(), kit);
        }
        assert!(HashKitId::from_code(0).is_err());
        assert_eq!(HashKitId::Sha256.digest(b"abc").len(), 32);
        assert_eq!(HashKitId::Sha512.digest(b"abc").len(), 64);
    }
}
