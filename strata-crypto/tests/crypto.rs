use num_bigint::BigUint;
use strata_crypto::{
    AuthKey, DecryptError, DequeBuffer, ENVELOPE_HEADER_LEN, MAX_PADDING, MIN_PADDING, Side, aes,
    decrypt_data_v2, decrypt_data_v2_with, encrypt_data_v2, encrypt_data_v2_with, sha1,
};

fn test_key(seed: u8) -> AuthKey {
    let mut data = [0u8; 256];
    data.iter_mut().enumerate().for_each(|(i, b)| *b = (i as u8).wrapping_mul(31).wrapping_add(seed));
    AuthKey::from_bytes(data)
}

fn encrypt(payload: &[u8], key: &AuthKey, side: Side) -> Vec<u8> {
    let mut buffer = DequeBuffer::with_capacity(payload.len(), ENVELOPE_HEADER_LEN);
    buffer.extend(payload.iter().copied());
    encrypt_data_v2_with(&mut buffer, key, side);
    buffer.into_vec()
}

// ── AES-IGE ───────────────────────────────────────────────────────────────────

#[test]
fn ige_roundtrip() {
    let key = [0x11u8; 32];
    let iv = [0x22u8; 32];
    let plain: Vec<u8> = (0..64u8).collect();

    let mut data = plain.clone();
    aes::ige_encrypt(&mut data, &key, &iv);
    assert_ne!(data, plain);
    aes::ige_decrypt(&mut data, &key, &iv);
    assert_eq!(data, plain);
}

#[test]
fn ige_error_propagates_forward() {
    let key = [0x33u8; 32];
    let iv = [0x44u8; 32];
    let plain = [0u8; 48];

    let mut data = plain;
    aes::ige_encrypt(&mut data, &key, &iv);
    data[0] ^= 1;
    aes::ige_decrypt(&mut data, &key, &iv);
    assert_ne!(&data[..16], &plain[..16]);
    assert_ne!(&data[16..32], &plain[16..32]);
}

// ── AuthKey ───────────────────────────────────────────────────────────────────

#[test]
fn key_id_and_aux_hash_come_from_sha1() {
    let key = test_key(1);
    let sha = sha1!(&key.to_bytes());
    assert_eq!(key.key_id(), sha[12..20]);
    assert_eq!(key.aux_hash(), sha[..8]);
}

#[test]
fn shared_secret_is_left_padded() {
    let key = AuthKey::from_shared_secret(&BigUint::from(0x0102u32)).unwrap();
    let bytes = key.to_bytes();
    assert!(bytes[..254].iter().all(|&b| b == 0));
    assert_eq!(&bytes[254..], &[0x01, 0x02]);
}

#[test]
fn shared_secret_rejects_zero_and_oversized() {
    assert!(AuthKey::from_shared_secret(&BigUint::from(0u32)).is_none());
    let wide = BigUint::from(1u32) << 2048usize;
    assert!(AuthKey::from_shared_secret(&wide).is_none());
    let full = (BigUint::from(1u32) << 2048usize) - 1u32;
    assert!(AuthKey::from_shared_secret(&full).is_some());
}

// ── MTProto 2.0 ───────────────────────────────────────────────────────────────

#[test]
fn client_frame_decrypts_as_client() {
    let key = test_key(2);
    let payload = b"ten bytes!";
    let mut frame = encrypt(payload, &key, Side::Client);

    assert_eq!(&frame[..8], &key.key_id());
    let padding = frame.len() - ENVELOPE_HEADER_LEN - payload.len();
    assert!((MIN_PADDING..=MAX_PADDING).contains(&padding));

    let plain = decrypt_data_v2_with(&mut frame, &key, Side::Client).unwrap();
    assert_eq!(&plain[..payload.len()], payload);
}

#[test]
fn server_frame_decrypts_with_default_direction() {
    let key = test_key(3);
    let payload = [9u8; 100];
    let mut frame = encrypt(&payload, &key, Side::Server);
    let plain = decrypt_data_v2(&mut frame, &key).unwrap();
    assert_eq!(&plain[..100], &payload);
}

#[test]
fn padding_varies_across_frames() {
    let key = test_key(4);
    let lens: std::collections::HashSet<usize> =
        (0..32).map(|_| encrypt(&[0u8; 16], &key, Side::Client).len()).collect();
    assert!(lens.len() > 1);
    assert!(lens.iter().all(|l| (l - ENVELOPE_HEADER_LEN) % 16 == 0));
}

#[test]
fn tampered_ciphertext_fails_msg_key_check() {
    let key = test_key(5);
    let mut buffer = DequeBuffer::with_capacity(32, ENVELOPE_HEADER_LEN);
    buffer.extend([7u8; 32]);
    encrypt_data_v2(&mut buffer, &key);
    let mut frame = buffer.into_vec();
    let last = frame.len() - 1;
    frame[last] ^= 0x80;
    assert_eq!(
        decrypt_data_v2_with(&mut frame, &key, Side::Client),
        Err(DecryptError::MessageKeyMismatch)
    );
}

#[test]
fn foreign_key_is_rejected() {
    let mut frame = encrypt(&[1u8; 8], &test_key(6), Side::Server);
    assert_eq!(
        decrypt_data_v2(&mut frame, &test_key(7)),
        Err(DecryptError::AuthKeyMismatch)
    );
}

#[test]
fn misaligned_buffer_is_rejected() {
    let key = test_key(8);
    let mut short = vec![0u8; 30];
    assert_eq!(decrypt_data_v2(&mut short, &key), Err(DecryptError::InvalidBuffer));
    let mut odd = vec![0u8; ENVELOPE_HEADER_LEN + 17];
    assert_eq!(decrypt_data_v2(&mut odd, &key), Err(DecryptError::InvalidBuffer));
}
