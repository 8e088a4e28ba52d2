//! Signed buffer verification and tamper resistance

mod common;

use common::{generate, mem_session, registry};
use rand::Rng;
use ski_keys::{
    segment_into_txns, verify_signed_buf, CryptoKitId, HashKitId, KeyDomain, KeyType, Packer,
    PayloadCodec, SkiError,
};

const MUTATIONS: usize = 1000;

fn mutate(buf: &[u8], rng: &mut impl Rng) -> Vec<u8> {
    let mut mutated = buf.to_vec();
    let idx = rng.gen_range(0..mutated.len());
    mutated[idx] ^= rng.gen_range(1..=255u8);
    mutated
}

#[tokio::test]
async fn test_verify_against_signer_and_other_key() {
    let registry = registry();
    let session = mem_session(&registry, "signer").await;
    let key = generate(&session, KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK).await;
    let other = generate(&session, KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK).await;

    let mut packer = Packer::new();
    packer
        .reset_session(session.clone(), key.clone(), HashKitId::Sha256, None)
        .await
        .unwrap();
    let info = packer.pack_and_sign(0, b"ledger entry", b"", 0).await.unwrap();

    let block = verify_signed_buf(registry.kits(), &info.signed_buf, Some(key.pub_key.as_slice())).unwrap();
    assert_eq!(block.payload, b"ledger entry");

    assert!(matches!(
        verify_signed_buf(registry.kits(), &info.signed_buf, Some(other.pub_key.as_slice())),
        Err(SkiError::VerificationFailed(_))
    ));

    // The raw signature does not verify under the other key either
    let kit = registry.crypto_kit(CryptoKitId::DALEK).unwrap();
    let signature = &info.signed_buf[info.signed_buf.len() - 64..];
    assert!(kit.verify(signature, &info.hash, &key.pub_key).is_ok());
    assert!(matches!(
        kit.verify(signature, &info.hash, &other.pub_key),
        Err(SkiError::VerificationFailed(_))
    ));

    session.end("done").await.unwrap();
}

#[tokio::test]
async fn test_single_byte_mutations_never_verify() {
    let registry = registry();
    let session = mem_session(&registry, "signer").await;
    let key = generate(&session, KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK).await;

    let mut packer = Packer::new();
    packer
        .reset_session(session.clone(), key.clone(), HashKitId::Sha256, None)
        .await
        .unwrap();
    let info = packer
        .pack_and_sign(0, b"some payload worth protecting", b"assoc", 1_700_000_000)
        .await
        .unwrap();

    let mut rng = rand::thread_rng();
    for _ in 0..MUTATIONS {
        let mutated = mutate(&info.signed_buf, &mut rng);
        assert!(verify_signed_buf(registry.kits(), &mutated, None).is_err());
    }

    session.end("done").await.unwrap();
}

#[tokio::test]
async fn test_single_byte_mutations_of_encrypted_buffer() {
    let registry = registry();
    let session = mem_session(&registry, "signer").await;
    let key = generate(&session, KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK).await;
    let sym = generate(&session, KeyType::Symmetric, KeyDomain::Community, CryptoKitId::AES_GCM).await;

    let mut packer = Packer::new();
    packer
        .reset_session(session.clone(), key, HashKitId::Sha512, Some(sym.clone()))
        .await
        .unwrap();
    let info = packer.pack_and_sign(0, b"sealed payload", b"", 0).await.unwrap();
    assert_eq!(
        packer.unpack_and_open(&info.signed_buf).await.unwrap().payload,
        b"sealed payload"
    );

    let mut rng = rand::thread_rng();
    for _ in 0..MUTATIONS {
        let mutated = mutate(&info.signed_buf, &mut rng);
        assert!(packer.unpack_and_open(&mutated).await.is_err());
    }

    // The ciphertext alone is also tamper evident
    let ciphertext = session
        .do_op(ski_keys::OpArgs::Encrypt {
            key_ref: sym.clone(),
            payload: b"sealed payload".to_vec(),
            recipient_pub_key: None,
        })
        .await
        .unwrap()
        .into_bytes()
        .unwrap();
    for _ in 0..MUTATIONS {
        let mutated = mutate(&ciphertext, &mut rng);
        let result = session
            .do_op(ski_keys::OpArgs::Decrypt {
                key_ref: sym.clone(),
                payload: mutated,
            })
            .await;
        assert!(result.is_err());
    }

    session.end("done").await.unwrap();
}

#[tokio::test]
async fn test_truncated_buffers_fail() {
    let registry = registry();
    let session = mem_session(&registry, "signer").await;
    let key = generate(&session, KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK).await;

    let mut packer = Packer::new();
    packer
        .reset_session(session.clone(), key, HashKitId::Sha256, None)
        .await
        .unwrap();
    let info = packer.pack_and_sign(0, b"abc", b"", 0).await.unwrap();

    for len in 0..info.signed_buf.len() {
        assert!(verify_signed_buf(registry.kits(), &info.signed_buf[..len], None).is_err());
    }
    let mut extended = info.signed_buf.clone();
    extended.push(0);
    assert!(matches!(
        verify_signed_buf(registry.kits(), &extended, None),
        Err(SkiError::DecodeFailed(_))
    ));

    session.end("done").await.unwrap();
}

#[test]
fn test_segment_counts() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let size = rng.gen_range(0..5000usize);
        let max = rng.gen_range(1..700usize);
        let data: Vec<u8> = (0..size).map(|_| rng.gen()).collect();

        let segments = segment_into_txns(&data, b"p", PayloadCodec::BINARY, max).unwrap();
        assert_eq!(segments.len(), size.div_ceil(max));
        assert!(segments
            .iter()
            .all(|s| s.info.total_segments as usize == segments.len()));

        let mut ordered = segments.clone();
        ordered.sort_by_key(|s| s.info.segment_num);
        let joined: Vec<u8> = ordered.into_iter().flat_map(|s| s.seg_data).collect();
        assert_eq!(joined, data);
    }
}
