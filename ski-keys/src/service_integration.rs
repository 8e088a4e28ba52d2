//! Service integration helpers for using SKI in services
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
use crate::kits::{AesGcmKit, DalekKit};
use crate::packer::Packer;
use crate::provider::SessionParams;
use crate::providers::{FileProvider, MemoryProvider};
use crate::registry::SkiRegistry;
use crate::session::Session;
use ski_config::SkiConfig;
use std::sync::Arc;
use tracing::info;

/// Build the registry with the built-in kits and providers
pub fn init_registry(config: &SkiConfig) -> SkiResult<Arc<SkiRegistry>> {
    info!(key_dir = %config.key_dir.display(), "Initializing SKI registry");

    let mut registry = SkiRegistry::new();
    registry.register_crypto_kit(Arc::new(DalekKit))?;
    registry.register_crypto_kit(Arc::new(AesGcmKit))?;
    registry.register_provider(Arc::new(MemoryProvider::new()))?;
    registry.register_provider(Arc::new(FileProvider::new(&config.key_dir)))?;

    Ok(Arc::new(registry))
}

/// Start a session on the configured default provider
pub async fn start_session(
    registry: &Arc<SkiRegistry>,
    config: &SkiConfig,
    identity: &str,
    community_id: CommunityId,
    credential: &[u8],
) -> SkiResult<Arc<Session>> {
    let params = SessionParams::new(
        config.default_provider.as_str(),
        identity,
        community_id,
        credential,
    )
    .with_keygen_max_attempts(config.keygen_max_attempts);

    let session = Session::start(registry.clone(), params).await?;
    Ok(Arc::new(session))
}

/// Unbound packer using the configured segment bound
pub fn new_packer(config: &SkiConfig) -> Packer {
    Packer::with_max_segment_size(config.max_segment_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkiError;
    use crate::key_types::{CryptoKitId, KeyDomain, KeyEntry, KeyType};
    use crate::kit::HashKitId;
    use crate::ops::OpArgs;
    use crate::segment::PayloadCodec;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn config(temp_dir: &TempDir, provider: &str) -> SkiConfig {
        let mut vars = HashMap::new();
        vars.insert("SKI_KEY_DIR".to_string(), temp_dir.path().display().to_string());
        vars.insert("SKI_DEFAULT_PROVIDER".to_string(), provider.to_string());
        SkiConfig::from_vars(vars).unwrap()
    }

    #[tokio::test]
    async fn test_start_session_on_default_provider() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir, "fs");
        let registry = init_registry(&config).unwrap();

        let session = start_session(&registry, &config, "node-1", CommunityId::new(vec![1]), b"pw")
            .await
            .unwrap();
        assert!(session.is_open());
        session.end("done").await.unwrap();
        assert!(temp_dir.path().join("node-1").join("vault.check").exists());
    }

    #[tokio::test]
    async fn test_unknown_default_provider() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir, "hsm");
        let registry = init_registry(&config).unwrap();

        let result = start_session(&registry, &config, "node-1", CommunityId::new(vec![1]), b"pw").await;
        assert!(matches!(result, Err(SkiError::ProviderNotFound(_))));
    }

    #[tokio::test]
    async fn test_configured_segment_bound_reaches_packer() {
        let temp_dir = TempDir::new().unwrap();
        let mut vars = HashMap::new();
        vars.insert("SKI_KEY_DIR".to_string(), temp_dir.path().display().to_string());
        vars.insert("SKI_DEFAULT_PROVIDER".to_string(), "mem".to_string());
        vars.insert("SKI_MAX_SEGMENT_SIZE".to_string(), "64".to_string());
        let config = SkiConfig::from_vars(vars).unwrap();
        let registry = init_registry(&config).unwrap();

        let session = start_session(&registry, &config, "node-1", CommunityId::new(vec![1]), b"pw")
            .await
            .unwrap();
        let signer = session
            .do_op(OpArgs::GenerateKeys {
                key_reqs: vec![KeyEntry::request(KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK)],
            })
            .await
            .unwrap()
            .into_keys()
            .unwrap()
            .keys[0]
            .key_ref();

        let mut packer = new_packer(&config);
        assert_eq!(packer.max_segment_size(), 64);
        packer
            .reset_session(session.clone(), signer.clone(), HashKitId::Sha256, None)
            .await
            .unwrap();

        let payload = vec![7u8; 200];
        let packed = packer
            .pack_and_sign_segments(0, &payload, b"blob", PayloadCodec::BINARY, b"", 0)
            .await
            .unwrap();
        assert_eq!(packed.len(), 4);

        // Segments from a sender with a looser bound are refused
        let mut loose = Packer::new();
        loose
            .reset_session(session.clone(), signer, HashKitId::Sha256, None)
            .await
            .unwrap();
        let oversized: Vec<Vec<u8>> = loose
            .pack_and_sign_segments(0, &payload, b"blob", PayloadCodec::BINARY, b"", 0)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.signed_buf)
            .collect();
        assert_eq!(oversized.len(), 1);
        assert!(matches!(
            packer.open_segments(&oversized).await,
            Err(SkiError::PayloadTooLarge { size: 200, max: 64 })
        ));

        session.end("done").await.unwrap();
    }
}
