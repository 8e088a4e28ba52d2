//! Shared setup for integration tests

#![allow(dead_code)]

use ski_keys::kits::{AesGcmKit, DalekKit};
use ski_keys::providers::MemoryProvider;
use ski_keys::{
    CommunityId, CryptoKitId, KeyDomain, KeyEntry, KeyRef, KeyType, OpArgs, Session,
    SessionParams, SkiRegistry,
};
use std::sync::Arc;

pub fn registry() -> Arc<SkiRegistry> {
    let mut registry = SkiRegistry::new();
    registry.register_crypto_kit(Arc::new(DalekKit)).unwrap();
    registry.register_crypto_kit(Arc::new(AesGcmKit)).unwrap();
    registry
        .register_provider(Arc::new(MemoryProvider::new()))
        .unwrap();
    Arc::new(registry)
}

pub fn community() -> CommunityId {
    CommunityId::new(vec![0x5A; 16])
}

pub async fn mem_session(registry: &Arc<SkiRegistry>, identity: &str) -> Arc<Session> {
    let params = SessionParams::new("mem", identity, community(), b"credential".to_vec());
    Arc::new(Session::start(registry.clone(), params).await.unwrap())
}

pub async fn generate(session: &Session, key_type: KeyType, domain: KeyDomain, kit: CryptoKitId) -> KeyRef {
    session
        .do_op(OpArgs::GenerateKeys {
            key_reqs: vec![KeyEntry::request(key_type, domain, kit)],
        })
        .await
        .unwrap()
        .into_keys()
        .unwrap()
        .keys[0]
        .key_ref()
}
