//! AES-256-GCM symmetric kit
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


use super::{generate_symmetric_key, AUTH_TAG_LEN, NONCE_LEN};
use crate::error::{SkiError, SkiResult};
use crate::key_types::{CryptoKitId, KeyType};
use crate::kit::CryptoKit;
use ::aes_gcm::{
    aead::{Aead, AeadCore, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;

/// Symmetric-only kit; output is `nonce || ciphertext`
pub struct AesGcmKit;

impl AesGcmKit {
    fn cipher(sym_key: &[u8]) -> SkiResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(sym_key).map_err(|_| {
            SkiError::Encryption(format!(
                "AES-256-GCM key must be 32 bytes, got {}",
                sym_key.len()
            ))
        })
    }
}

impl CryptoKit for AesGcmKit {
    fn id(&self) -> CryptoKitId {
        CryptoKitId::AES_GCM
    }

    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }

    fn generate_key(&self, key_type: KeyType) -> SkiResult<(Vec<u8>, Vec<u8>)> {
        match key_type {
            KeyType::Symmetric => Ok(generate_symmetric_key()),
            other => Err(SkiError::UnsupportedKeyType(format!(
                "{} only generates symmetric keys, not {:?}",
                self.name(),
                other
            ))),
        }
    }

    fn encrypt(&self, sym_key: &[u8], msg: &[u8]) -> SkiResult<Vec<u8>> {
        let cipher = Self::cipher(sym_key)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, msg)
            .map_err(|e| SkiError::Encryption(format!("Encryption failed: {}", e)))?;

        // Prepend nonce to ciphertext
        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt(&self, sym_key: &[u8], buf: &[u8]) -> SkiResult<Vec<u8>> {
        if buf.len() < NONCE_LEN + AUTH_TAG_LEN {
            return Err(SkiError::DecodeFailed("Encrypted data too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = buf.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Self::cipher(sym_key)?;

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SkiError::VerificationFailed("AES-256-GCM authentication failed".to_string()))
    }
}
