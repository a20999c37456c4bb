//! Cryptographic primitives for the strata MTProto engine.
//!
//! Provides:
//! - AES-256-IGE encryption/decryption
//! - SHA-1 / SHA-256 hash macros
//! - `AuthKey`: the 256-byte shared key and its identifiers
//! - MTProto 2.0 message encryption / decryption for either direction
//!
//! The key exchange that produces the shared secret is not part of this
//! crate; [`AuthKey::from_shared_secret`] accepts its result.

#![deny(unsafe_code)]

pub mod aes;
mod auth_key;
mod deque_buffer;
#[doc(hidden)]
pub mod sha;

pub use auth_key::{AUTH_KEY_LEN, AuthKey};
pub use deque_buffer::DequeBuffer;

/// Smallest random padding appended to a plaintext before encryption.
pub const MIN_PADDING: usize = 12;
/// Largest random padding appended to a plaintext before encryption.
pub const MAX_PADDING: usize = 1024;

/// Bytes in front of every ciphertext: `auth_key_id || msg_key`.
pub const ENVELOPE_HEADER_LEN: usize = 24;

// ─── MTProto 2.0 encrypt / decrypt ───────────────────────────────────────────

/// Errors from [`decrypt_data_v2`].
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptError {
    /// Ciphertext too short or not block-aligned.
    InvalidBuffer,
    /// The `auth_key_id` in the ciphertext does not match our key.
    AuthKeyMismatch,
    /// The `msg_key` in the ciphertext does not match our computed value.
    MessageKeyMismatch,
}

impl std::fmt::Display for DecryptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBuffer => write!(f, "invalid ciphertext buffer length"),
            Self::AuthKeyMismatch => write!(f, "auth_key_id mismatch"),
            Self::MessageKeyMismatch => write!(f, "msg_key mismatch"),
        }
    }
}
impl std::error::Error for DecryptError {}

/// Which end of the connection produced a ciphertext.
///
/// Key derivation reads different slices of the auth key per direction
/// (`x = 0` for client→server, `x = 8` for server→client).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    fn x(self) -> usize {
        match self {
            Side::Client => 0,
            Side::Server => 8,
        }
    }
}

fn calc_key(auth_key: &AuthKey, msg_key: &[u8; 16], side: Side) -> ([u8; 32], [u8; 32]) {
    let x = side.x();
    let sha_a = sha256!(msg_key, &auth_key.data[x..x + 36]);
    let sha_b = sha256!(&auth_key.data[40 + x..40 + x + 36], msg_key);

    let mut aes_key = [0u8; 32];
    aes_key[..8].copy_from_slice(&sha_a[..8]);
    aes_key[8..24].copy_from_slice(&sha_b[8..24]);
    aes_key[24..].copy_from_slice(&sha_a[24..]);

    let mut aes_iv = [0u8; 32];
    aes_iv[..8].copy_from_slice(&sha_b[..8]);
    aes_iv[8..24].copy_from_slice(&sha_a[8..24]);
    aes_iv[24..].copy_from_slice(&sha_b[24..]);

    (aes_key, aes_iv)
}

/// `msg_key = SHA256(auth_key[88+x..120+x] || plaintext)[8..24]`.
fn calc_msg_key(auth_key: &AuthKey, plaintext: &[u8], side: Side) -> [u8; 16] {
    let x = side.x();
    let large = sha256!(&auth_key.data[88 + x..88 + x + 32], plaintext);
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&large[8..24]);
    msg_key
}

/// Padding for a plaintext of `len` bytes: at least [`MIN_PADDING`], at most
/// [`MAX_PADDING`], total length a multiple of 16.  `extra_blocks` picks how
/// many additional 16-byte blocks are added on top of the minimum.
fn padding_len(len: usize, extra_blocks: u8) -> usize {
    let base = MIN_PADDING + (16 - (len + MIN_PADDING) % 16) % 16;
    let max_extra = (MAX_PADDING - base) / 16;
    base + 16 * (extra_blocks as usize % (max_extra + 1))
}

fn fill_random(buf: &mut [u8]) {
    getrandom::getrandom(buf).expect("getrandom failed");
}

/// Encrypt `buffer` as the client.
///
/// After this call `buffer` contains `key_id || msg_key || ciphertext`.
pub fn encrypt_data_v2(buffer: &mut DequeBuffer, auth_key: &AuthKey) {
    encrypt_data_v2_with(buffer, auth_key, Side::Client);
}

/// Encrypt `buffer` in place as `side`, appending random padding first.
pub fn encrypt_data_v2_with(buffer: &mut DequeBuffer, auth_key: &AuthKey, side: Side) {
    let mut extra = [0u8; 1];
    fill_random(&mut extra);
    let mut padding = vec![0u8; padding_len(buffer.len(), extra[0])];
    fill_random(&mut padding);
    do_encrypt_data_v2(buffer, auth_key, &padding, side);
}

pub(crate) fn do_encrypt_data_v2(buffer: &mut DequeBuffer, auth_key: &AuthKey, padding: &[u8], side: Side) {
    buffer.extend(padding.iter().copied());

    let msg_key = calc_msg_key(auth_key, buffer.as_ref(), side);
    let (key, iv) = calc_key(auth_key, &msg_key, side);
    aes::ige_encrypt(buffer.as_mut(), &key, &iv);

    buffer.extend_front(&msg_key);
    buffer.extend_front(&auth_key.key_id);
}

/// Decrypt a ciphertext sent by the server.
///
/// `buffer` must start with `key_id || msg_key || ciphertext`.
/// On success returns a slice of `buffer` containing the plaintext
/// (still including its padding).
pub fn decrypt_data_v2<'a>(buffer: &'a mut [u8], auth_key: &AuthKey) -> Result<&'a mut [u8], DecryptError> {
    decrypt_data_v2_with(buffer, auth_key, Side::Server)
}

/// Decrypt a ciphertext produced by `from`.
pub fn decrypt_data_v2_with<'a>(
    buffer: &'a mut [u8],
    auth_key: &AuthKey,
    from: Side,
) -> Result<&'a mut [u8], DecryptError> {
    if buffer.len() < ENVELOPE_HEADER_LEN + 16 || (buffer.len() - ENVELOPE_HEADER_LEN) % 16 != 0 {
        return Err(DecryptError::InvalidBuffer);
    }
    if auth_key.key_id != buffer[..8] {
        return Err(DecryptError::AuthKeyMismatch);
    }
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&buffer[8..24]);

    let (key, iv) = calc_key(auth_key, &msg_key, from);
    aes::ige_decrypt(&mut buffer[ENVELOPE_HEADER_LEN..], &key, &iv);

    if calc_msg_key(auth_key, &buffer[ENVELOPE_HEADER_LEN..], from) != msg_key {
        return Err(DecryptError::MessageKeyMismatch);
    }
    Ok(&mut buffer[ENVELOPE_HEADER_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AuthKey {
        let mut data = [0u8; 256];
        data.iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
        AuthKey::from_bytes(data)
    }

    #[test]
    fn padding_stays_in_bounds() {
        for len in 0..64 {
            for extra in [0u8, 1, 62, 63, 64, 200, 255] {
                let pad = padding_len(len, extra);
                assert!((MIN_PADDING..=MAX_PADDING).contains(&pad), "len={len} extra={extra} pad={pad}");
                assert_eq!((len + pad) % 16, 0);
            }
        }
    }

    #[test]
    fn deterministic_padding_roundtrip() {
        let auth_key = key();
        let mut buffer = DequeBuffer::with_capacity(64, ENVELOPE_HEADER_LEN);
        buffer.extend(b"0123456789abcdef0123".iter().copied());
        let padding = [7u8; 28];
        do_encrypt_data_v2(&mut buffer, &auth_key, &padding, Side::Server);

        let mut bytes = buffer.into_vec();
        assert_eq!(bytes.len(), ENVELOPE_HEADER_LEN + 48);
        let plain = decrypt_data_v2(&mut bytes, &auth_key).unwrap();
        assert_eq!(&plain[..20], b"0123456789abcdef0123");
        assert_eq!(&plain[20..], &padding);
    }

    #[test]
    fn directions_do_not_mix() {
        let auth_key = key();
        let mut buffer = DequeBuffer::with_capacity(32, ENVELOPE_HEADER_LEN);
        buffer.extend([1u8; 16]);
        encrypt_data_v2(&mut buffer, &auth_key);

        let mut bytes = buffer.into_vec();
        assert_eq!(
            decrypt_data_v2(&mut bytes, &auth_key),
            Err(DecryptError::MessageKeyMismatch)
        );
    }
}
