//! Secure Key Interface (SKI)
//!
//! Pluggable key management and crypto sessions for community members:
//! per-community keyrings, registered crypto kits and storage providers,
//! serialized async op dispatch, and a packer that signs payloads into
//! self-describing buffers.
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


pub mod error;
pub mod framing;
pub mod key_store;
pub mod key_types;
pub mod keyring;
pub mod kit;
pub mod kits;
pub mod ops;
pub mod packer;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod segment;
pub mod service_integration;
pub mod session;
pub mod vault;

pub use error::{SkiError, SkiResult};
pub use key_store::KeyStore;
pub use key_types::{
    CommunityId, CryptoKitId, KeyBundle, KeyDomain, KeyEntry, KeyId, KeyRef, KeyType,
};
pub use keyring::KeyringSet;
pub use kit::{CryptoKit, CryptoKitRegistry, HashKitId};
pub use ops::{OpArgs, OpResult};
pub use packer::{verify_signed_buf, Packer, PackingInfo, SignedBlock, PACK_SKIP_ENCRYPTION};
pub use provider::{Provider, SessionParams};
pub use registry::SkiRegistry;
pub use segment::{assemble_segments, segment_into_txns, PayloadCodec, TxnSegInfo, TxnSegment};
pub use service_integration::*;
pub use session::{Session, SessionState};
pub use vault::{KeyVault, VaultClaim, VaultClaims};
