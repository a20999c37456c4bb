//! The 256-byte authorization key shared with the server.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::sha1;

/// Length of an authorization key in bytes.
pub const AUTH_KEY_LEN: usize = 256;

/// An authorization key plus its pre-computed identifiers.
///
/// `key_id` is `SHA1(key)[12..20]` and names the key in every encrypted
/// frame; `aux_hash` is `SHA1(key)[..8]`.
#[derive(Clone)]
pub struct AuthKey {
    pub(crate) data: [u8; AUTH_KEY_LEN],
    pub(crate) aux_hash: [u8; 8],
    pub(crate) key_id: [u8; 8],
}

impl AuthKey {
    /// Construct from the raw 256-byte key.
    pub fn from_bytes(data: [u8; AUTH_KEY_LEN]) -> Self {
        let sha = sha1!(&data);
        let mut aux_hash = [0u8; 8];
        aux_hash.copy_from_slice(&sha[..8]);
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&sha[12..20]);
        Self { data, aux_hash, key_id }
    }

    /// Build a key from the shared secret produced by a key exchange.
    ///
    /// The integer is written big-endian and left-padded with zeros to 256
    /// bytes.  Returns `None` for zero or for values wider than 2048 bits.
    pub fn from_shared_secret(secret: &BigUint) -> Option<Self> {
        if secret.is_zero() {
            return None;
        }
        let be = secret.to_bytes_be();
        if be.len() > AUTH_KEY_LEN {
            return None;
        }
        let mut data = [0u8; AUTH_KEY_LEN];
        data[AUTH_KEY_LEN - be.len()..].copy_from_slice(&be);
        Some(Self::from_bytes(data))
    }

    /// Return the raw 256-byte representation.
    pub fn to_bytes(&self) -> [u8; AUTH_KEY_LEN] { self.data }

    /// The 8-byte key identifier.
    pub fn key_id(&self) -> [u8; 8] { self.key_id }

    /// The 8-byte auxiliary hash.
    pub fn aux_hash(&self) -> [u8; 8] { self.aux_hash }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthKey(id={:#018x})", u64::from_le_bytes(self.key_id))
    }
}

impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool { self.key_id == other.key_id }
}

impl Eq for AuthKey {}
