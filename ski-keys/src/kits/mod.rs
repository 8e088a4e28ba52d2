//! Built-in crypto kits
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


mod aes;
mod dalek;

pub use aes::AesGcmKit;
pub use dalek::DalekKit;

use rand::rngs::OsRng;
use rand::RngCore;

/// Nonce length shared by ChaCha20-Poly1305 and AES-256-GCM (12 bytes)
pub const NONCE_LEN: usize = 12;

/// AEAD authentication tag length (16 bytes)
pub const AUTH_TAG_LEN: usize = 16;

/// Length of every symmetric and curve key produced by the built-in kits
pub const KEY_LEN: usize = 32;

/// Generate cryptographically secure random bytes
pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Random private key plus a random public tag for a symmetric key
pub(crate) fn generate_symmetric_key() -> (Vec<u8>, Vec<u8>) {
    let tag = random_bytes::<KEY_LEN>();
    let key = random_bytes::<KEY_LEN>();
    (tag.to_vec(), key.to_vec())
}
