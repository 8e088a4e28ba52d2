//! Packer: hash, sign and optionally encrypt payloads into self-describing
//! signed buffers
//!
//! Buffer layout:
//! ```text
//! u8 version | varint flags | varint signer_kit | varint hash_kit
//! | varbuf signer_pub | varint time_sealed | varint enc_domain
//! | varbuf enc_pub | varbuf associated_data | varbuf payload
//! | varbuf signature
//! ```
//! The signature covers the hash of every byte before it. An empty `enc_pub`
//! means the payload is in the clear.
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
use crate::framing::{append_var_buf, read_u32, read_var_buf, read_varint, write_varint};
use crate::key_types::{CryptoKitId, KeyDomain, KeyEntry, KeyRef, KeyType};
use crate::kit::{CryptoKitRegistry, HashKitId};
use crate::ops::OpArgs;
use crate::segment::{assemble_segments, segment_into_txns, PayloadCodec, TxnSegment};
use crate::session::Session;
use ski_config::DEFAULT_MAX_SEGMENT_SIZE;
use std::sync::Arc;
use tracing::debug;

pub const PACK_VERSION: u8 = 1;

/// Leave the payload in the clear even when an encryption key is bound
pub const PACK_SKIP_ENCRYPTION: u64 = 0x1;

/// What a pack call produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingInfo {
    pub time_sealed: u64,
    /// Hash the signature was made over
    pub hash: Vec<u8>,
    pub signed_buf: Vec<u8>,
    pub signer_pub_key: Vec<u8>,
}

/// A verified, parsed signed buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBlock {
    pub flags: u64,
    pub signer_kit: CryptoKitId,
    pub hash_kit: HashKitId,
    pub signer_pub_key: Vec<u8>,
    pub time_sealed: u64,
    /// Key the payload was encrypted with, if any
    pub encrypt_key: Option<KeyRef>,
    pub associated_data: Vec<u8>,
    pub payload: Vec<u8>,
    pub hash: Vec<u8>,
}

struct BodyFields<'a> {
    flags: u64,
    signer_kit: CryptoKitId,
    hash_kit: HashKitId,
    signer_pub_key: &'a [u8],
    time_sealed: u64,
    encrypt_key: Option<&'a KeyRef>,
    associated_data: &'a [u8],
    payload: &'a [u8],
}

fn encode_body(fields: &BodyFields<'_>) -> SkiResult<Vec<u8>> {
    let mut body = Vec::with_capacity(fields.payload.len() + fields.associated_data.len() + 128);
    body.push(PACK_VERSION);
    write_varint(&mut body, fields.flags);
    write_varint(&mut body, u64::from(fields.signer_kit.0));
    write_varint(&mut body, fields.hash_kit.code());
    append_var_buf(&mut body, fields.signer_pub_key)?;
    write_varint(&mut body, fields.time_sealed);
    match fields.encrypt_key {
        Some(key_ref) => {
            let domain = key_ref.domain()?;
            write_varint(&mut body, i32::from(domain) as u64);
            append_var_buf(&mut body, &key_ref.pub_key)?;
        }
        None => {
            write_varint(&mut body, 0);
            append_var_buf(&mut body, &[])?;
        }
    }
    append_var_buf(&mut body, fields.associated_data)?;
    append_var_buf(&mut body, fields.payload)?;
    Ok(body)
}

/// Parse and verify a signed buffer using only the kit registry.
///
/// With `expected_signer` set, a buffer signed by any other key fails with
/// `VerificationFailed`. The payload is returned as stored, still encrypted
/// when `encrypt_key` is set.
pub fn verify_signed_buf(
    kits: &CryptoKitRegistry,
    buf: &[u8],
    expected_signer: Option<&[u8]>,
) -> SkiResult<SignedBlock> {
    let version = *buf
        .first()
        .ok_or_else(|| SkiError::DecodeFailed("empty signed buffer".to_string()))?;
    if version != PACK_VERSION {
        return Err(SkiError::DecodeFailed(format!("unknown pack version {}", version)));
    }

    let (flags, offset) = read_varint(buf, 1)?;
    let (signer_kit, offset) = read_u32(buf, offset)?;
    let (hash_kit, offset) = read_varint(buf, offset)?;
    let hash_kit = HashKitId::from_code(hash_kit)?;
    let (signer_pub_key, offset) = read_var_buf(buf, offset)?;
    let (time_sealed, offset) = read_varint(buf, offset)?;
    let (enc_domain, offset) = read_u32(buf, offset)?;
    let (enc_pub, offset) = read_var_buf(buf, offset)?;
    let (associated_data, offset) = read_var_buf(buf, offset)?;
    let (payload, body_end) = read_var_buf(buf, offset)?;
    let (signature, end) = read_var_buf(buf, body_end)?;
    if end != buf.len() {
        return Err(SkiError::DecodeFailed("trailing bytes after signature".to_string()));
    }

    let encrypt_key = if enc_pub.is_empty() {
        if enc_domain != 0 {
            return Err(SkiError::DecodeFailed("key domain set without a key".to_string()));
        }
        None
    } else {
        let domain = i32::try_from(enc_domain)
            .ok()
            .and_then(|d| KeyDomain::try_from(d).ok())
            .ok_or_else(|| SkiError::DecodeFailed(format!("bad key domain {}", enc_domain)))?;
        Some(KeyRef::new(domain, enc_pub))
    };

    if let Some(expected) = expected_signer {
        if expected != signer_pub_key {
            return Err(SkiError::VerificationFailed("unexpected signer".to_string()));
        }
    }

    let hash = hash_kit.digest(&buf[..body_end]);
    let kit = kits.lookup(CryptoKitId(signer_kit))?;
    kit.verify(signature, &hash, signer_pub_key)?;

    Ok(SignedBlock {
        flags,
        signer_kit: CryptoKitId(signer_kit),
        hash_kit,
        signer_pub_key: signer_pub_key.to_vec(),
        time_sealed,
        encrypt_key,
        associated_data: associated_data.to_vec(),
        payload: payload.to_vec(),
        hash,
    })
}

struct Binding {
    session: Arc<Session>,
    signer: KeyEntry,
    hash_kit: HashKitId,
    encrypt_key: Option<KeyEntry>,
}

/// Signs (and optionally encrypts) payloads on behalf of one signing key
pub struct Packer {
    binding: Option<Binding>,
    max_segment_size: usize,
}

impl Default for Packer {
    fn default() -> Self {
        Self::with_max_segment_size(DEFAULT_MAX_SEGMENT_SIZE)
    }
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound used both to split outgoing payloads and to accept incoming segments
    pub fn with_max_segment_size(max_segment_size: usize) -> Self {
        Self {
            binding: None,
            max_segment_size,
        }
    }

    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }

    /// Bind to a session and signing key. Must precede any pack call; call
    /// again to switch keys. On failure the packer is left unbound.
    pub async fn reset_session(
        &mut self,
        session: Arc<Session>,
        key_ref: KeyRef,
        hash_kit: HashKitId,
        encrypt_key: Option<KeyRef>,
    ) -> SkiResult<()> {
        self.binding = None;

        let signer = session
            .do_op(OpArgs::ResolveKey { key_ref })
            .await?
            .into_key()?;
        if signer.key_type != KeyType::Signing {
            return Err(SkiError::UnsupportedKeyType(format!(
                "packer needs a signing key, {} is {:?}",
                signer.key_id(),
                signer.key_type
            )));
        }

        let encrypt_key = match encrypt_key {
            Some(key_ref) => {
                let entry = session
                    .do_op(OpArgs::ResolveKey { key_ref })
                    .await?
                    .into_key()?;
                if entry.key_type == KeyType::Signing {
                    return Err(SkiError::UnsupportedKeyType(format!(
                        "signing key {} cannot encrypt payloads",
                        entry.key_id()
                    )));
                }
                Some(entry)
            }
            None => None,
        };

        debug!(
            session_id = %session.session_id(),
            signer = %signer.key_id(),
            encrypted = encrypt_key.is_some(),
            "Packer bound to session"
        );

        self.binding = Some(Binding {
            session,
            signer,
            hash_kit,
            encrypt_key,
        });
        Ok(())
    }

    fn binding(&self) -> SkiResult<&Binding> {
        let binding = self
            .binding
            .as_ref()
            .ok_or_else(|| SkiError::Configuration("packer has no session".to_string()))?;
        if !binding.session.is_open() {
            return Err(SkiError::SessionClosed);
        }
        Ok(binding)
    }

    /// Sign `payload` (encrypting it first when an encryption key is bound).
    /// A non-zero `time_sealed` replaces the wall clock.
    pub async fn pack_and_sign(
        &self,
        flags: u64,
        payload: &[u8],
        associated_data: &[u8],
        time_sealed: u64,
    ) -> SkiResult<PackingInfo> {
        let binding = self.binding()?;
        let time_sealed = if time_sealed != 0 {
            time_sealed
        } else {
            chrono::Utc::now().timestamp().max(0) as u64
        };

        let encrypt_key = binding
            .encrypt_key
            .as_ref()
            .filter(|_| flags & PACK_SKIP_ENCRYPTION == 0)
            .map(KeyEntry::key_ref);

        let sealed_payload;
        let payload = match &encrypt_key {
            Some(key_ref) => {
                sealed_payload = binding
                    .session
                    .do_op(OpArgs::Encrypt {
                        key_ref: key_ref.clone(),
                        payload: payload.to_vec(),
                        recipient_pub_key: None,
                    })
                    .await?
                    .into_bytes()?;
                sealed_payload.as_slice()
            }
            None => payload,
        };

        let mut signed_buf = encode_body(&BodyFields {
            flags,
            signer_kit: binding.signer.crypto_kit,
            hash_kit: binding.hash_kit,
            signer_pub_key: &binding.signer.pub_key,
            time_sealed,
            encrypt_key: encrypt_key.as_ref(),
            associated_data,
            payload,
        })?;

        let hash = binding.hash_kit.digest(&signed_buf);
        let signature = binding
            .session
            .do_op(OpArgs::Sign {
                key_ref: binding.signer.key_ref(),
                payload: hash.clone(),
            })
            .await?
            .into_signature()?;
        append_var_buf(&mut signed_buf, &signature)?;

        debug!(
            signer = %binding.signer.key_id(),
            size = signed_buf.len(),
            encrypted = encrypt_key.is_some(),
            "Packed payload"
        );

        Ok(PackingInfo {
            time_sealed,
            hash,
            signed_buf,
            signer_pub_key: binding.signer.pub_key.clone(),
        })
    }

    /// Verify a signed buffer and decrypt its payload if needed
    pub async fn unpack_and_open(&self, signed_buf: &[u8]) -> SkiResult<SignedBlock> {
        let binding = self.binding()?;
        let mut block = verify_signed_buf(binding.session.registry().kits(), signed_buf, None)?;

        if let Some(key_ref) = &block.encrypt_key {
            block.payload = binding
                .session
                .do_op(OpArgs::Decrypt {
                    key_ref: key_ref.clone(),
                    payload: std::mem::take(&mut block.payload),
                })
                .await?
                .into_bytes()?;
        }
        Ok(block)
    }

    /// Segment `payload` and pack every segment record separately
    #[allow(clippy::too_many_arguments)]
    pub async fn pack_and_sign_segments(
        &self,
        flags: u64,
        payload: &[u8],
        payload_name: &[u8],
        payload_codec: PayloadCodec,
        associated_data: &[u8],
        time_sealed: u64,
    ) -> SkiResult<Vec<PackingInfo>> {
        let time_sealed = if time_sealed != 0 {
            time_sealed
        } else {
            chrono::Utc::now().timestamp().max(0) as u64
        };

        let segments = segment_into_txns(payload, payload_name, payload_codec, self.max_segment_size)?;
        let mut packed = Vec::with_capacity(segments.len());
        for segment in &segments {
            let record = segment.encode()?;
            packed.push(
                self.pack_and_sign(flags, &record, associated_data, time_sealed)
                    .await?,
            );
        }
        Ok(packed)
    }

    /// Open buffers from [`Packer::pack_and_sign_segments`] and reassemble the
    /// payload. Every buffer must come from the same signer.
    pub async fn open_segments(&self, signed_bufs: &[Vec<u8>]) -> SkiResult<Vec<u8>> {
        let mut signer: Option<Vec<u8>> = None;
        let mut segments = Vec::with_capacity(signed_bufs.len());

        for buf in signed_bufs {
            let block = self.unpack_and_open(buf).await?;
            match &signer {
                Some(expected) if *expected != block.signer_pub_key => {
                    return Err(SkiError::VerificationFailed(
                        "segments signed by different keys".to_string(),
                    ));
                }
                Some(_) => {}
                None => signer = Some(block.signer_pub_key.clone()),
            }
            segments.push(TxnSegment::decode(&block.payload, self.max_segment_size)?);
        }

        assemble_segments(segments, self.max_segment_size)
    }
}
