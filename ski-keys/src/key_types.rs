//! Key type definitions
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
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroize;

/// Width of a [`KeyId`] in bytes
pub const KEY_ID_LEN: usize = 20;

/// Number of variants in [`KeyDomain`]
pub const NUM_KEY_DOMAINS: usize = 3;

/// Fixed-width key identifier derived from a key's public material
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId([u8; KEY_ID_LEN]);

impl KeyId {
    /// Derive the identifier for the given public key (or symmetric key tag)
    pub fn from_pub_key(pub_key: &[u8]) -> Self {
        let digest = Sha256::digest(pub_key);
        let mut id = [0u8; KEY_ID_LEN];
        id.copy_from_slice(&digest[..KEY_ID_LEN]);
        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self)
    }
}

/// Usage scope of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum KeyDomain {
    /// Keys private to the member (identity, inbound key transfer)
    Personal = 0,
    /// Keys shared by all members of a community
    Community = 1,
    /// Keys used to sign ledger entries and storage txns
    Signing = 2,
}

impl KeyDomain {
    pub const ALL: [KeyDomain; NUM_KEY_DOMAINS] =
        [KeyDomain::Personal, KeyDomain::Community, KeyDomain::Signing];

    /// Position of this domain in a per-domain array
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<i32> for KeyDomain {
    type Error = SkiError;

    fn try_from(value: i32) -> SkiResult<Self> {
        match value {
            0 => Ok(KeyDomain::Personal),
            1 => Ok(KeyDomain::Community),
            2 => Ok(KeyDomain::Signing),
            other => Err(SkiError::KeyDomainNotFound(other)),
        }
    }
}

impl From<KeyDomain> for i32 {
    fn from(domain: KeyDomain) -> i32 {
        domain as i32
    }
}

/// Key type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Secret key shared between parties; public bytes are a random tag
    Symmetric,
    /// Key agreement keypair used to encrypt to a peer
    Asymmetric,
    /// Signature keypair
    Signing,
}

/// Identifier of a registered crypto kit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CryptoKitId(pub u32);

impl CryptoKitId {
    /// Ed25519 signing, X25519 sealed boxes, ChaCha20-Poly1305
    pub const DALEK: CryptoKitId = CryptoKitId(1);
    /// AES-256-GCM symmetric encryption
    pub const AES_GCM: CryptoKitId = CryptoKitId(2);
}

impl fmt::Display for CryptoKitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a ledger community
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommunityId(#[serde(with = "hex_bytes")] Vec<u8>);

impl CommunityId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex-encoded community identifier
    pub fn from_hex(s: &str) -> SkiResult<Self> {
        hex::decode(s)
            .map(Self)
            .map_err(|e| SkiError::DecodeFailed(format!("Invalid community ID: {}", e)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommunityId({})", self)
    }
}

/// A held key, or a key request when the key bytes are empty
///
/// `key_domain` is kept as the raw wire value so that an out-of-range domain
/// survives decoding and is rejected by the key store instead of the decoder.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub key_type: KeyType,
    pub key_domain: i32,
    pub crypto_kit: CryptoKitId,
    #[serde(with = "hex_bytes")]
    pub pub_key: Vec<u8>,
    #[serde(with = "hex_bytes", default, skip_serializing_if = "Vec::is_empty")]
    pub priv_key: Vec<u8>,
    pub created_at: i64,
}

impl KeyEntry {
    /// Build a key generation request
    pub fn request(key_type: KeyType, domain: KeyDomain, crypto_kit: CryptoKitId) -> Self {
        Self {
            key_type,
            key_domain: domain.into(),
            crypto_kit,
            pub_key: Vec::new(),
            priv_key: Vec::new(),
            created_at: 0,
        }
    }

    pub fn key_id(&self) -> KeyId {
        KeyId::from_pub_key(&self.pub_key)
    }

    pub fn domain(&self) -> SkiResult<KeyDomain> {
        KeyDomain::try_from(self.key_domain)
    }

    pub fn has_private_key(&self) -> bool {
        !self.priv_key.is_empty()
    }

    /// Copy of this entry without its private bytes
    pub fn public_only(&self) -> Self {
        Self {
            key_type: self.key_type,
            key_domain: self.key_domain,
            crypto_kit: self.crypto_kit,
            pub_key: self.pub_key.clone(),
            priv_key: Vec::new(),
            created_at: self.created_at,
        }
    }

    pub fn key_ref(&self) -> KeyRef {
        KeyRef {
            key_domain: self.key_domain,
            pub_key: self.pub_key.clone(),
        }
    }
}

impl Drop for KeyEntry {
    fn drop(&mut self) {
        self.priv_key.zeroize();
    }
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("key_id", &self.key_id())
            .field("key_type", &self.key_type)
            .field("key_domain", &self.key_domain)
            .field("crypto_kit", &self.crypto_kit)
            .field("priv_key", &if self.has_private_key() { "<redacted>" } else { "<none>" })
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Names a key held in a session's key store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRef {
    pub key_domain: i32,
    #[serde(with = "hex_bytes")]
    pub pub_key: Vec<u8>,
}

impl KeyRef {
    pub fn new(domain: KeyDomain, pub_key: impl Into<Vec<u8>>) -> Self {
        Self {
            key_domain: domain.into(),
            pub_key: pub_key.into(),
        }
    }

    pub fn key_id(&self) -> KeyId {
        KeyId::from_pub_key(&self.pub_key)
    }

    pub fn domain(&self) -> SkiResult<KeyDomain> {
        KeyDomain::try_from(self.key_domain)
    }
}

/// Serializable set of keys for transfer between key stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    pub community_id: CommunityId,
    pub keys: Vec<KeyEntry>,
}

impl KeyBundle {
    pub fn new(community_id: CommunityId, keys: Vec<KeyEntry>) -> Self {
        Self { community_id, keys }
    }

    /// Encode this bundle. The output carries private key bytes when the
    /// entries do; callers own erasing it.
    pub fn to_bytes(&self) -> SkiResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> SkiResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| SkiError::DecodeFailed(format!("Invalid key bundle: {}", e)))
    }
}

/// Hex encoding for binary fields
pub(crate) mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&hex::encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(de::Error::custom)
    }
}
