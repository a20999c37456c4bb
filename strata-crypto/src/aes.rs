//! AES-256 in Infinite Garble Extension (IGE) mode.
//!
//! The 32-byte IV is split in two halves: the first seeds the previous
//! ciphertext block, the second the previous plaintext block.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

const BLOCK: usize = 16;

fn xor_into(dst: &mut [u8; BLOCK], src: &[u8]) {
    dst.iter_mut().zip(src).for_each(|(d, s)| *d ^= s);
}

fn split_iv(iv: &[u8; 32]) -> ([u8; BLOCK], [u8; BLOCK]) {
    let mut c = [0u8; BLOCK];
    let mut p = [0u8; BLOCK];
    c.copy_from_slice(&iv[..BLOCK]);
    p.copy_from_slice(&iv[BLOCK..]);
    (c, p)
}

/// Encrypt `buffer` in place.
///
/// # Panics
///
/// If `buffer.len()` is not a multiple of 16.
pub fn ige_encrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % BLOCK, 0, "IGE input must be block-aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let (mut prev_cipher, mut prev_plain) = split_iv(iv);

    for chunk in buffer.chunks_exact_mut(BLOCK) {
        let mut plain = [0u8; BLOCK];
        plain.copy_from_slice(chunk);

        let mut block = plain;
        xor_into(&mut block, &prev_cipher);
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));
        xor_into(&mut block, &prev_plain);

        chunk.copy_from_slice(&block);
        prev_cipher = block;
        prev_plain = plain;
    }
}

/// Decrypt `buffer` in place.
///
/// # Panics
///
/// If `buffer.len()` is not a multiple of 16.
pub fn ige_decrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % BLOCK, 0, "IGE input must be block-aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let (mut prev_cipher, mut prev_plain) = split_iv(iv);

    for chunk in buffer.chunks_exact_mut(BLOCK) {
        let mut ciphertext = [0u8; BLOCK];
        ciphertext.copy_from_slice(chunk);

        let mut block = ciphertext;
        xor_into(&mut block, &prev_plain);
        cipher.decrypt_block(GenericArray::from_mut_slice(&mut block));
        xor_into(&mut block, &prev_cipher);

        chunk.copy_from_slice(&block);
        prev_cipher = ciphertext;
        prev_plain = block;
    }
}
