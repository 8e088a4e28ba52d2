//! Ed25519 / X25519 / ChaCha20-Poly1305 kit
//!
//! - Signing keys: Ed25519, verified with `verify_strict`
//! - Asymmetric keys: X25519 sealed boxes (`ephemeral_pub || nonce || ciphertext`)
//! - Symmetric keys: ChaCha20-Poly1305 (`nonce || ciphertext`)
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


use super::{generate_symmetric_key, AUTH_TAG_LEN, KEY_LEN, NONCE_LEN};
use crate::error::{SkiError, SkiResult};
use crate::key_types::{CryptoKitId, KeyType};
use crate::kit::CryptoKit;
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Domain separation label for the sealed box key derivation
const SEAL_LABEL: &[u8] = b"ski-sealed-box-v1";

pub struct DalekKit;

fn key_array(bytes: &[u8], what: &str) -> SkiResult<Zeroizing<[u8; KEY_LEN]>> {
    let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
        SkiError::DecodeFailed(format!(
            "{} must be {} bytes, got {}",
            what,
            KEY_LEN,
            bytes.len()
        ))
    })?;
    Ok(Zeroizing::new(array))
}

/// Symmetric key for one sealed box, bound to both public keys
fn seal_key(shared: &[u8], ephemeral_pub: &[u8], recipient_pub: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut hasher = Sha256::new();
    hasher.update(SEAL_LABEL);
    hasher.update(shared);
    hasher.update(ephemeral_pub);
    hasher.update(recipient_pub);
    Zeroizing::new(hasher.finalize().into())
}

fn chacha_seal(key: &[u8; KEY_LEN], msg: &[u8]) -> SkiResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, msg)
        .map_err(|e| SkiError::Encryption(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

fn chacha_open(key: &[u8; KEY_LEN], buf: &[u8]) -> SkiResult<Vec<u8>> {
    if buf.len() < NONCE_LEN + AUTH_TAG_LEN {
        return Err(SkiError::DecodeFailed("Encrypted data too short".to_string()));
    }
    let (nonce, ciphertext) = buf.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SkiError::VerificationFailed("ChaCha20-Poly1305 authentication failed".to_string()))
}

impl CryptoKit for DalekKit {
    fn id(&self) -> CryptoKitId {
        CryptoKitId::DALEK
    }

    fn name(&self) -> &'static str {
        "dalek"
    }

    fn generate_key(&self, key_type: KeyType) -> SkiResult<(Vec<u8>, Vec<u8>)> {
        match key_type {
            KeyType::Signing => {
                let signing_key = SigningKey::generate(&mut OsRng);
                let pub_key = signing_key.verifying_key().to_bytes().to_vec();
                Ok((pub_key, signing_key.to_bytes().to_vec()))
            }
            KeyType::Asymmetric => {
                let secret = StaticSecret::random_from_rng(OsRng);
                let pub_key = PublicKey::from(&secret).as_bytes().to_vec();
                Ok((pub_key, secret.to_bytes().to_vec()))
            }
            KeyType::Symmetric => Ok(generate_symmetric_key()),
        }
    }

    fn sign(&self, priv_key: &[u8], msg: &[u8]) -> SkiResult<Vec<u8>> {
        let secret = key_array(priv_key, "Ed25519 private key")?;
        let signing_key = SigningKey::from_bytes(&secret);
        Ok(signing_key.sign(msg).to_bytes().to_vec())
    }

    fn verify(&self, signature: &[u8], msg: &[u8], pub_key: &[u8]) -> SkiResult<()> {
        let pub_bytes: [u8; KEY_LEN] = pub_key
            .try_into()
            .map_err(|_| SkiError::VerificationFailed("Malformed Ed25519 public key".to_string()))?;
        let verifying_key = VerifyingKey::from_bytes(&pub_bytes)
            .map_err(|_| SkiError::VerificationFailed("Invalid Ed25519 public key".to_string()))?;
        let signature = Signature::from_slice(signature)
            .map_err(|_| SkiError::VerificationFailed("Malformed signature".to_string()))?;

        verifying_key
            .verify_strict(msg, &signature)
            .map_err(|_| SkiError::VerificationFailed("Signature mismatch".to_string()))
    }

    fn encrypt(&self, sym_key: &[u8], msg: &[u8]) -> SkiResult<Vec<u8>> {
        let key = key_array(sym_key, "ChaCha20-Poly1305 key")?;
        chacha_seal(&key, msg)
    }

    fn decrypt(&self, sym_key: &[u8], buf: &[u8]) -> SkiResult<Vec<u8>> {
        let key = key_array(sym_key, "ChaCha20-Poly1305 key")?;
        chacha_open(&key, buf)
    }

    fn encrypt_for(&self, recipient_pub_key: &[u8], msg: &[u8]) -> SkiResult<Vec<u8>> {
        let recipient_bytes: [u8; KEY_LEN] = recipient_pub_key.try_into().map_err(|_| {
            SkiError::Encryption("Recipient X25519 public key must be 32 bytes".to_string())
        })?;
        let recipient = PublicKey::from(recipient_bytes);

        let ephemeral = StaticSecret::random_from_rng(OsRng);
        let ephemeral_pub = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&recipient);
        let key = seal_key(shared.as_bytes(), ephemeral_pub.as_bytes(), recipient.as_bytes());

        let sealed = chacha_seal(&key, msg)?;
        let mut result = Vec::with_capacity(KEY_LEN + sealed.len());
        result.extend_from_slice(ephemeral_pub.as_bytes());
        result.extend_from_slice(&sealed);
        Ok(result)
    }

    fn decrypt_from(&self, priv_key: &[u8], buf: &[u8]) -> SkiResult<Vec<u8>> {
        if buf.len() < KEY_LEN + NONCE_LEN + AUTH_TAG_LEN {
            return Err(SkiError::DecodeFailed("Sealed box too short".to_string()));
        }
        let secret = StaticSecret::from(*key_array(priv_key, "X25519 private key")?);
        let own_pub = PublicKey::from(&secret);

        let (ephemeral_bytes, sealed) = buf.split_at(KEY_LEN);
        let ephemeral_pub = PublicKey::from(*key_array(ephemeral_bytes, "Ephemeral public key")?);
        let shared = secret.diffie_hellman(&ephemeral_pub);
        let key = seal_key(shared.as_bytes(), ephemeral_pub.as_bytes(), own_pub.as_bytes());

        chacha_open(&key, sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let kit = DalekKit;
        let (pub_key, priv_key) = kit.generate_key(KeyType::Signing).unwrap();
        let (other_pub, _) = kit.generate_key(KeyType::Signing).unwrap();

        let signature = kit.sign(&priv_key, b"entry hash").unwrap();
        kit.verify(&signature, b"entry hash", &pub_key).unwrap();

        assert!(matches!(
            kit.verify(&signature, b"entry hash", &other_pub),
            Err(SkiError::VerificationFailed(_))
        ));
        assert!(matches!(
            kit.verify(&signature, b"other hash", &pub_key),
            Err(SkiError::VerificationFailed(_))
        ));
        assert!(matches!(
            kit.verify(&signature[..10], b"entry hash", &pub_key),
            Err(SkiError::VerificationFailed(_))
        ));
    }

    #[test]
    fn test_sealed_box_roundtrip() {
        let kit = DalekKit;
        let (pub_key, priv_key) = kit.generate_key(KeyType::Asymmetric).unwrap();
        let (_, other_priv) = kit.generate_key(KeyType::Asymmetric).unwrap();

        let sealed = kit.encrypt_for(&pub_key, b"community key bundle").unwrap();
        assert_eq!(kit.decrypt_from(&priv_key, &sealed).unwrap(), b"community key bundle");
        assert!(matches!(
            kit.decrypt_from(&other_priv, &sealed),
            Err(SkiError::VerificationFailed(_))
        ));
    }

    #[test]
    fn test_symmetric_roundtrip_and_tamper() {
        let kit = DalekKit;
        let (tag, key) = kit.generate_key(KeyType::Symmetric).unwrap();
        assert_ne!(tag, key);

        let mut sealed = kit.encrypt(&key, b"hello, community").unwrap();
        assert_eq!(kit.decrypt(&key, &sealed).unwrap(), b"hello, community");

        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(kit.decrypt(&key, &sealed).is_err());
    }

    #[test]
    fn test_each_key_is_fresh() {
        let kit = DalekKit;
        let (a, _) = kit.generate_key(KeyType::Signing).unwrap();
        let (b, _) = kit.generate_key(KeyType::Signing).unwrap();
        assert_ne!(a, b);
    }
}
