//! ski-keygen
//!
//! Generates the starter keys of a member identity and prints their public
//! halves as a JSON key bundle.
//!
//! Usage: `SKI_CREDENTIAL=... ski-keygen <identity> <community-id-hex>`
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


use anyhow::{bail, Context, Result};
use ski_config::SkiConfig;
use ski_keys::{
    init_registry, start_session, CommunityId, CryptoKitId, KeyDomain, KeyEntry, KeyType, OpArgs,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SkiConfig::from_env().context("Failed to load configuration")?;
    ski_logging::init("ski-keygen", config.log_level(), config.log_json);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [identity, community_hex] = args.as_slice() else {
        bail!("usage: ski-keygen <identity> <community-id-hex>");
    };
    let community_id = CommunityId::from_hex(community_hex).context("Invalid community id")?;
    let credential = std::env::var("SKI_CREDENTIAL").context("SKI_CREDENTIAL is not set")?;

    let registry = init_registry(&config)?;
    let session = start_session(
        &registry,
        &config,
        identity,
        community_id.clone(),
        credential.as_bytes(),
    )
    .await?;

    info!(
        identity = %identity,
        community_id = %community_id,
        session_id = %session.session_id(),
        "Generating member keys"
    );

    let key_reqs = vec![
        KeyEntry::request(KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK),
        KeyEntry::request(KeyType::Asymmetric, KeyDomain::Personal, CryptoKitId::DALEK),
        KeyEntry::request(KeyType::Symmetric, KeyDomain::Community, CryptoKitId::AES_GCM),
    ];

    let generated = session
        .do_op(OpArgs::GenerateKeys { key_reqs })
        .await
        .and_then(|result| result.into_keys());

    if let Err(e) = session.end("keygen complete").await {
        error!(error = %e, "Failed to end session cleanly");
    }

    let bundle = generated?;
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    info!(keys = bundle.keys.len(), "Keys generated");

    Ok(())
}
