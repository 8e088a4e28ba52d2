//! Typed session operations and their execution against a key store
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
use crate::key_store::KeyStore;
use crate::key_types::{CommunityId, CryptoKitId, KeyBundle, KeyEntry, KeyRef, KeyType};
use crate::keyring::KeyringSet;
use crate::registry::SkiRegistry;
use crate::vault::KeyVault;
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// One operation request dispatched to a session
#[derive(Debug, Clone)]
pub enum OpArgs {
    /// Generate one key per request entry (entries carry type, domain and kit only)
    GenerateKeys { key_reqs: Vec<KeyEntry> },
    /// Public half of a held key
    ResolveKey { key_ref: KeyRef },
    /// Held keys, private bytes included, for transfer to another member
    ExportKeys { key_refs: Vec<KeyRef> },
    /// Public halves of every key in one domain
    ExportKeyring { domain: i32 },
    /// Export keys sealed to a peer's asymmetric public key
    ExportKeysFor {
        key_refs: Vec<KeyRef>,
        recipient_pub_key: Vec<u8>,
        crypto_kit: CryptoKitId,
    },
    ImportKeys { bundle: KeyBundle },
    /// Open a buffer from `ExportKeysFor` with a held asymmetric key and merge it
    ImportSealedKeys { sealed: Vec<u8>, key_ref: KeyRef },
    Sign { key_ref: KeyRef, payload: Vec<u8> },
    Verify {
        crypto_kit: CryptoKitId,
        pub_key: Vec<u8>,
        payload: Vec<u8>,
        signature: Vec<u8>,
    },
    /// Symmetric keys encrypt directly. Asymmetric keys seal to
    /// `recipient_pub_key`, or to the key itself when none is given.
    Encrypt {
        key_ref: KeyRef,
        payload: Vec<u8>,
        recipient_pub_key: Option<Vec<u8>>,
    },
    Decrypt { key_ref: KeyRef, payload: Vec<u8> },
}

impl OpArgs {
    pub fn name(&self) -> &'static str {
        match self {
            OpArgs::GenerateKeys { .. } => "generate_keys",
            OpArgs::ResolveKey { .. } => "resolve_key",
            OpArgs::ExportKeys { .. } => "export_keys",
            OpArgs::ExportKeyring { .. } => "export_keyring",
            OpArgs::ExportKeysFor { .. } => "export_keys_for",
            OpArgs::ImportKeys { .. } => "import_keys",
            OpArgs::ImportSealedKeys { .. } => "import_sealed_keys",
            OpArgs::Sign { .. } => "sign",
            OpArgs::Verify { .. } => "verify",
            OpArgs::Encrypt { .. } => "encrypt",
            OpArgs::Decrypt { .. } => "decrypt",
        }
    }
}

/// Result of a completed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResult {
    Keys(KeyBundle),
    Key(KeyEntry),
    /// Entries an import could not merge
    NotMerged(Vec<KeyEntry>),
    Signature(Vec<u8>),
    Verified,
    Bytes(Vec<u8>),
}

fn unexpected(expected: &str, got: &OpResult) -> SkiError {
    SkiError::Internal(format!("expected {} result, got {:?}", expected, got))
}

impl OpResult {
    pub fn into_keys(self) -> SkiResult<KeyBundle> {
        match self {
            OpResult::Keys(bundle) => Ok(bundle),
            other => Err(unexpected("keys", &other)),
        }
    }

    pub fn into_key(self) -> SkiResult<KeyEntry> {
        match self {
            OpResult::Key(entry) => Ok(entry),
            other => Err(unexpected("key", &other)),
        }
    }

    pub fn into_not_merged(self) -> SkiResult<Vec<KeyEntry>> {
        match self {
            OpResult::NotMerged(entries) => Ok(entries),
            other => Err(unexpected("not-merged", &other)),
        }
    }

    pub fn into_signature(self) -> SkiResult<Vec<u8>> {
        match self {
            OpResult::Signature(sig) => Ok(sig),
            other => Err(unexpected("signature", &other)),
        }
    }

    pub fn into_bytes(self) -> SkiResult<Vec<u8>> {
        match self {
            OpResult::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected("bytes", &other)),
        }
    }
}

/// State an operation runs against; owned by the session worker
pub(crate) struct OpContext {
    pub registry: Arc<SkiRegistry>,
    pub key_store: Arc<KeyStore>,
    pub vault: Arc<dyn KeyVault>,
    pub community_id: CommunityId,
    pub keygen_max_attempts: u32,
}

impl OpContext {
    async fn keyrings(&self) -> SkiResult<Arc<KeyringSet>> {
        self.key_store.fetch_keyrings(&self.community_id).await
    }

    async fn lookup(&self, key_ref: &KeyRef) -> SkiResult<KeyEntry> {
        let keyrings = self.keyrings().await?;
        keyrings
            .export_named_keys(std::slice::from_ref(key_ref), true)
            .await?
            .pop()
            .flatten()
            .ok_or_else(|| SkiError::KeyIdNotFound(key_ref.key_id().to_string()))
    }

    /// Held key with its private half
    async fn lookup_private(&self, key_ref: &KeyRef) -> SkiResult<KeyEntry> {
        let entry = self.lookup(key_ref).await?;
        require_private(&entry)?;
        Ok(entry)
    }

    async fn persist(&self, community_id: &CommunityId) -> SkiResult<()> {
        let bundle = self.key_store.export_bundle(community_id).await?;
        self.vault.store_bundle(&bundle).await
    }

    async fn merge(&self, bundle: KeyBundle) -> SkiResult<Vec<KeyEntry>> {
        let community_id = bundle.community_id.clone();
        let keyrings = self.key_store.fetch_or_create_keyrings(&community_id).await;
        let not_merged = keyrings.merge_keys(bundle.keys).await?;
        self.persist(&community_id).await?;
        Ok(not_merged)
    }
}

fn require_private(entry: &KeyEntry) -> SkiResult<()> {
    if !entry.has_private_key() {
        return Err(SkiError::UnsupportedKeyType(format!(
            "key {} has no private half",
            entry.key_id()
        )));
    }
    Ok(())
}

fn require_key_type(entry: &KeyEntry, key_type: KeyType) -> SkiResult<()> {
    if entry.key_type != key_type {
        return Err(SkiError::UnsupportedKeyType(format!(
            "key {} is {:?}, expected {:?}",
            entry.key_id(),
            entry.key_type,
            key_type
        )));
    }
    Ok(())
}

/// Run one operation to completion
pub(crate) async fn execute_op(ctx: &OpContext, args: OpArgs) -> SkiResult<OpResult> {
    let op = args.name();
    debug!(op = op, community_id = %ctx.community_id, "Executing op");

    let result = run(ctx, args).await;
    if let Err(e) = &result {
        debug!(op = op, error = %e, "Op failed");
    }
    result
}

async fn run(ctx: &OpContext, args: OpArgs) -> SkiResult<OpResult> {
    match args {
        OpArgs::GenerateKeys { key_reqs } => {
            let keyrings = ctx.keyrings().await?;
            let new_keys = keyrings
                .generate_new_keys(ctx.registry.kits(), &key_reqs, ctx.keygen_max_attempts)
                .await?;
            if let Err(e) = ctx.persist(&ctx.community_id).await {
                let removed = keyrings.remove_keys(&new_keys).await?;
                warn!(removed = removed, error = %e, "Discarded generated keys that could not be stored");
                return Err(e);
            }

            let public = new_keys.iter().map(KeyEntry::public_only).collect();
            Ok(OpResult::Keys(KeyBundle::new(ctx.community_id.clone(), public)))
        }

        OpArgs::ResolveKey { key_ref } => {
            let entry = ctx.lookup(&key_ref).await?;
            Ok(OpResult::Key(entry.public_only()))
        }

        OpArgs::ExportKeys { key_refs } => {
            let keyrings = ctx.keyrings().await?;
            let keys = keyrings
                .export_named_keys(&key_refs, true)
                .await?
                .into_iter()
                .flatten()
                .collect();
            Ok(OpResult::Keys(KeyBundle::new(ctx.community_id.clone(), keys)))
        }

        OpArgs::ExportKeyring { domain } => {
            let keyrings = ctx.keyrings().await?;
            let keys = keyrings
                .export_keyring(domain)
                .await?
                .iter()
                .map(KeyEntry::public_only)
                .collect();
            Ok(OpResult::Keys(KeyBundle::new(ctx.community_id.clone(), keys)))
        }

        OpArgs::ExportKeysFor {
            key_refs,
            recipient_pub_key,
            crypto_kit,
        } => {
            let kit = ctx.registry.crypto_kit(crypto_kit)?;
            let keyrings = ctx.keyrings().await?;
            let keys = keyrings
                .export_named_keys(&key_refs, true)
                .await?
                .into_iter()
                .flatten()
                .collect();
            let bundle = KeyBundle::new(ctx.community_id.clone(), keys);
            let plain = Zeroizing::new(bundle.to_bytes()?);
            Ok(OpResult::Bytes(kit.encrypt_for(&recipient_pub_key, &plain)?))
        }

        OpArgs::ImportKeys { bundle } => Ok(OpResult::NotMerged(ctx.merge(bundle).await?)),

        OpArgs::ImportSealedKeys { sealed, key_ref } => {
            let entry = ctx.lookup_private(&key_ref).await?;
            require_key_type(&entry, KeyType::Asymmetric)?;
            let kit = ctx.registry.crypto_kit(entry.crypto_kit)?;

            let plain = Zeroizing::new(kit.decrypt_from(&entry.priv_key, &sealed)?);
            let bundle = KeyBundle::from_bytes(&plain)?;
            let not_merged = ctx.merge(bundle).await?;
            if !not_merged.is_empty() {
                warn!(rejected = not_merged.len(), "Sealed import left keys unmerged");
            }
            Ok(OpResult::NotMerged(not_merged))
        }

        OpArgs::Sign { key_ref, payload } => {
            let entry = ctx.lookup_private(&key_ref).await?;
            require_key_type(&entry, KeyType::Signing)?;
            let kit = ctx.registry.crypto_kit(entry.crypto_kit)?;
            Ok(OpResult::Signature(kit.sign(&entry.priv_key, &payload)?))
        }

        OpArgs::Verify {
            crypto_kit,
            pub_key,
            payload,
            signature,
        } => {
            let kit = ctx.registry.crypto_kit(crypto_kit)?;
            kit.verify(&signature, &payload, &pub_key)?;
            Ok(OpResult::Verified)
        }

        OpArgs::Encrypt {
            key_ref,
            payload,
            recipient_pub_key,
        } => {
            let entry = ctx.lookup(&key_ref).await?;
            let kit = ctx.registry.crypto_kit(entry.crypto_kit)?;
            let out = match entry.key_type {
                KeyType::Symmetric => {
                    require_private(&entry)?;
                    kit.encrypt(&entry.priv_key, &payload)?
                }
                KeyType::Asymmetric => {
                    let recipient = recipient_pub_key
                        .as_deref()
                        .unwrap_or(entry.pub_key.as_slice());
                    kit.encrypt_for(recipient, &payload)?
                }
                KeyType::Signing => {
                    return Err(SkiError::UnsupportedKeyType(format!(
                        "signing key {} cannot encrypt",
                        entry.key_id()
                    )))
                }
            };
            Ok(OpResult::Bytes(out))
        }

        OpArgs::Decrypt { key_ref, payload } => {
            let entry = ctx.lookup_private(&key_ref).await?;
            let kit = ctx.registry.crypto_kit(entry.crypto_kit)?;
            let out = match entry.key_type {
                KeyType::Symmetric => kit.decrypt(&entry.priv_key, &payload)?,
                KeyType::Asymmetric => kit.decrypt_from(&entry.priv_key, &payload)?,
                KeyType::Signing => {
                    return Err(SkiError::UnsupportedKeyType(format!(
                        "signing key {} cannot decrypt",
                        entry.key_id()
                    )))
                }
            };
            Ok(OpResult::Bytes(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_types::KeyDomain;
    use crate::kits::{AesGcmKit, DalekKit};
    use crate::provider::{Provider, SessionParams};
    use crate::providers::MemoryProvider;

    async fn context(identity: &str) -> OpContext {
        let mut registry = SkiRegistry::new();
        registry.register_crypto_kit(Arc::new(DalekKit)).unwrap();
        registry.register_crypto_kit(Arc::new(AesGcmKit)).unwrap();

        let community_id = CommunityId::new(vec![7; 8]);
        let params = SessionParams::new("mem", identity, community_id.clone(), b"pw".to_vec());
        let vault = MemoryProvider::new().open_vault(&params).await.unwrap();

        let key_store = Arc::new(KeyStore::new());
        key_store.fetch_or_create_keyrings(&community_id).await;

        OpContext {
            registry: Arc::new(registry),
            key_store,
            vault,
            community_id,
            keygen_max_attempts: 4,
        }
    }

    async fn generate(ctx: &OpContext, key_type: KeyType, domain: KeyDomain, kit: CryptoKitId) -> KeyEntry {
        let args = OpArgs::GenerateKeys {
            key_reqs: vec![KeyEntry::request(key_type, domain, kit)],
        };
        let mut bundle = execute_op(ctx, args).await.unwrap().into_keys().unwrap();
        bundle.keys.remove(0)
    }

    #[tokio::test]
    async fn test_generate_returns_public_only_and_persists() {
        let ctx = context("alice").await;
        let key = generate(&ctx, KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK).await;
        assert!(!key.has_private_key());

        let stored = ctx.vault.load_bundles().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].keys.len(), 1);
        assert!(stored[0].keys[0].has_private_key());
        assert_eq!(stored[0].keys[0].pub_key, key.pub_key);
    }

    #[tokio::test]
    async fn test_sign_and_verify() {
        let ctx = context("alice").await;
        let key = generate(&ctx, KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK).await;

        let signature = execute_op(
            &ctx,
            OpArgs::Sign {
                key_ref: key.key_ref(),
                payload: b"hello".to_vec(),
            },
        )
        .await
        .unwrap()
        .into_signature()
        .unwrap();

        let verify = |payload: &[u8]| OpArgs::Verify {
            crypto_kit: CryptoKitId::DALEK,
            pub_key: key.pub_key.clone(),
            payload: payload.to_vec(),
            signature: signature.clone(),
        };
        assert_eq!(execute_op(&ctx, verify(b"hello")).await.unwrap(), OpResult::Verified);
        assert!(matches!(
            execute_op(&ctx, verify(b"hellp")).await,
            Err(SkiError::VerificationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_key_type_checks() {
        let ctx = context("alice").await;
        let signing = generate(&ctx, KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK).await;
        let sym = generate(&ctx, KeyType::Symmetric, KeyDomain::Community, CryptoKitId::AES_GCM).await;

        let encrypt = execute_op(
            &ctx,
            OpArgs::Encrypt {
                key_ref: signing.key_ref(),
                payload: b"x".to_vec(),
                recipient_pub_key: None,
            },
        )
        .await;
        assert!(matches!(encrypt, Err(SkiError::UnsupportedKeyType(_))));

        let sign = execute_op(
            &ctx,
            OpArgs::Sign {
                key_ref: sym.key_ref(),
                payload: b"x".to_vec(),
            },
        )
        .await;
        assert!(matches!(sign, Err(SkiError::UnsupportedKeyType(_))));
    }

    #[tokio::test]
    async fn test_symmetric_and_asymmetric_encryption() {
        let ctx = context("alice").await;
        for (key_type, kit) in [
            (KeyType::Symmetric, CryptoKitId::AES_GCM),
            (KeyType::Symmetric, CryptoKitId::DALEK),
            (KeyType::Asymmetric, CryptoKitId::DALEK),
        ] {
            let key = generate(&ctx, key_type, KeyDomain::Personal, kit).await;
            let sealed = execute_op(
                &ctx,
                OpArgs::Encrypt {
                    key_ref: key.key_ref(),
                    payload: b"secret".to_vec(),
                    recipient_pub_key: None,
                },
            )
            .await
            .unwrap()
            .into_bytes()
            .unwrap();

            let opened = execute_op(
                &ctx,
                OpArgs::Decrypt {
                    key_ref: key.key_ref(),
                    payload: sealed,
                },
            )
            .await
            .unwrap()
            .into_bytes()
            .unwrap();
            assert_eq!(opened, b"secret");
        }
    }

    #[tokio::test]
    async fn test_sealed_key_transfer() {
        let alice = context("alice").await;
        let bob = context("bob").await;

        let shared = generate(&alice, KeyType::Symmetric, KeyDomain::Community, CryptoKitId::AES_GCM).await;
        let bob_box = generate(&bob, KeyType::Asymmetric, KeyDomain::Personal, CryptoKitId::DALEK).await;

        let sealed = execute_op(
            &alice,
            OpArgs::ExportKeysFor {
                key_refs: vec![shared.key_ref()],
                recipient_pub_key: bob_box.pub_key.clone(),
                crypto_kit: CryptoKitId::DALEK,
            },
        )
        .await
        .unwrap()
        .into_bytes()
        .unwrap();

        let not_merged = execute_op(
            &bob,
            OpArgs::ImportSealedKeys {
                sealed,
                key_ref: bob_box.key_ref(),
            },
        )
        .await
        .unwrap()
        .into_not_merged()
        .unwrap();
        assert!(not_merged.is_empty());

        let alice_full = execute_op(&alice, OpArgs::ExportKeys { key_refs: vec![shared.key_ref()] })
            .await
            .unwrap()
            .into_keys()
            .unwrap();
        let bob_full = execute_op(&bob, OpArgs::ExportKeys { key_refs: vec![shared.key_ref()] })
            .await
            .unwrap()
            .into_keys()
            .unwrap();
        assert_eq!(alice_full, bob_full);
        assert!(bob_full.keys[0].has_private_key());
    }

    #[tokio::test]
    async fn test_missing_key_and_bad_domain() {
        let ctx = context("alice").await;
        let missing = KeyRef::new(KeyDomain::Signing, vec![1; 32]);
        assert!(matches!(
            execute_op(&ctx, OpArgs::ResolveKey { key_ref: missing }).await,
            Err(SkiError::KeyIdNotFound(_))
        ));
        assert!(matches!(
            execute_op(&ctx, OpArgs::ExportKeyring { domain: 3 }).await,
            Err(SkiError::KeyDomainNotFound(3))
        ));
    }

    struct ReadOnlyVault;

    #[async_trait::async_trait]
    impl KeyVault for ReadOnlyVault {
        async fn load_bundles(&self) -> SkiResult<Vec<KeyBundle>> {
            Ok(Vec::new())
        }

        async fn store_bundle(&self, _bundle: &KeyBundle) -> SkiResult<()> {
            Err(SkiError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only vault",
            )))
        }

        async fn close(&self) -> SkiResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_generate_discards_keys_it_cannot_store() {
        let mut ctx = context("alice").await;
        ctx.vault = Arc::new(ReadOnlyVault);

        let args = OpArgs::GenerateKeys {
            key_reqs: vec![KeyEntry::request(KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK)],
        };
        assert!(matches!(execute_op(&ctx, args).await, Err(SkiError::Io(_))));

        let held = ctx.key_store.export_bundle(&ctx.community_id).await.unwrap();
        assert!(held.keys.is_empty());
    }
}
