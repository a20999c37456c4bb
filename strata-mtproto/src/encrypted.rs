//! Protocol state and the encrypted frame codec.
//!
//! [`EncryptedSession`] holds everything a connection needs to produce and
//! accept MTProto 2.0 frames: the auth key, the server salt, a random
//! session id, the outgoing sequence counter, the message-id clock and the
//! clock offset against the server.  Encoding and decoding are pure
//! functions of that state; only id and sequence allocation mutate it.

use std::time::{SystemTime, UNIX_EPOCH};

use strata_crypto::{AuthKey, DequeBuffer, Side, decrypt_data_v2_with, encrypt_data_v2_with};

use crate::message::{Message, MsgId};

/// `salt || session_id || msg_id || seq_no || length`
const PLAINTEXT_HEADER_LEN: usize = 8 + 8 + 8 + 4 + 4;

/// Errors that can occur when decrypting a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptError {
    /// The underlying crypto layer rejected the message.
    Crypto(strata_crypto::DecryptError),
    /// The decrypted inner message was too short to contain a valid header.
    FrameTooShort,
    /// Session-ID mismatch (possible replay or wrong connection).
    SessionMismatch,
    /// The declared body length is too large, or leaves a padding outside
    /// the 12..=1024 byte range.
    InvalidLength {
        /// Body length declared in the header.
        declared: usize,
        /// Bytes following the header.
        available: usize,
    },
    /// The server answered with a 4-byte transport error instead of a frame.
    Transport {
        /// Negative error code, e.g. `-404`.
        code: i32,
    },
}

impl std::fmt::Display for DecryptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::FrameTooShort => write!(f, "inner plaintext too short"),
            Self::SessionMismatch => write!(f, "session_id mismatch"),
            Self::InvalidLength { declared, available } => {
                write!(f, "implausible body length {declared} (have {available} bytes)")
            }
            Self::Transport { code } => write!(f, "transport error {code}"),
        }
    }
}

impl std::error::Error for DecryptError {}

impl From<strata_crypto::DecryptError> for DecryptError {
    fn from(e: strata_crypto::DecryptError) -> Self {
        Self::Crypto(e)
    }
}

/// The inner payload extracted from a successfully decrypted frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DecryptedMessage {
    /// `salt` the sender used.
    pub salt: i64,
    /// The `session_id` from the frame.
    pub session_id: i64,
    /// The envelope carried by the frame.
    pub message: Message,
}

fn le_i64(b: &[u8], at: usize) -> i64 {
    let mut a = [0u8; 8];
    a.copy_from_slice(&b[at..at + 8]);
    i64::from_le_bytes(a)
}

fn le_i32(b: &[u8], at: usize) -> i32 {
    let mut a = [0u8; 4];
    a.copy_from_slice(&b[at..at + 4]);
    i32::from_le_bytes(a)
}

pub(crate) fn unix_now() -> std::time::Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// MTProto 2.0 encrypted session state.
pub struct EncryptedSession {
    auth_key: AuthKey,
    session_id: i64,
    /// Session replaced by [`EncryptedSession::correct_time_offset`]; late
    /// answers to it are still accepted.
    previous_session_id: Option<i64>,
    sequence: i32,
    last_msg_id: i64,
    last_inbound_seq: Option<i32>,
    /// Current server salt to include in outgoing messages.
    pub salt: i64,
    /// Clock skew in seconds vs. server.
    pub time_offset: i32,
}

impl EncryptedSession {
    /// Start a session with a fresh random session id.
    pub fn new(auth_key: AuthKey, first_salt: i64, time_offset: i32) -> Self {
        let mut rnd = [0u8; 8];
        getrandom::getrandom(&mut rnd).expect("getrandom");
        Self::with_session_id(auth_key, first_salt, time_offset, i64::from_le_bytes(rnd))
    }

    /// Start a session with a caller-chosen session id.
    pub fn with_session_id(auth_key: AuthKey, first_salt: i64, time_offset: i32, session_id: i64) -> Self {
        Self {
            auth_key,
            session_id,
            previous_session_id: None,
            sequence: 0,
            last_msg_id: 0,
            last_inbound_seq: None,
            salt: first_salt,
            time_offset,
        }
    }

    /// Allocate the next message id.
    ///
    /// Derived from the corrected clock; if the clock did not advance past
    /// the previous id, the previous id plus 4 is used instead.
    pub fn next_msg_id(&mut self) -> MsgId {
        let mut id = self.clock_msg_id();
        if self.last_msg_id >= id {
            id = self.last_msg_id + 4;
        }
        self.last_msg_id = id;
        MsgId(id)
    }

    fn clock_msg_id(&self) -> i64 {
        let now = unix_now();
        let secs = (now.as_secs() as i64).wrapping_add(self.time_offset as i64);
        let nanos = now.subsec_nanos() as i64;
        (secs << 32) | (nanos << 2)
    }

    /// Sequence value for the next message.
    ///
    /// Content-related messages get `2n + 1` and advance the counter;
    /// others get `2n`.
    pub fn next_seq_no(&mut self, content_related: bool) -> i32 {
        if content_related {
            let n = self.sequence * 2 + 1;
            self.sequence += 1;
            n
        } else {
            self.sequence * 2
        }
    }

    /// Move the outgoing sequence counter by `delta` (never below zero).
    pub fn adjust_sequence(&mut self, delta: i32) {
        self.sequence = (self.sequence + delta).max(0);
    }

    /// Re-derive the clock offset from the timestamp embedded in a server
    /// message id.
    ///
    /// Message ids never decrease within a session.  If the corrected clock
    /// is behind the last id handed out, a new session is started: fresh
    /// session id, sequence back to zero.
    pub fn correct_time_offset(&mut self, server_msg_id: MsgId) {
        let local = unix_now().as_secs() as i64;
        self.time_offset = (server_msg_id.secs() - local) as i32;
        log::info!("[strata] clock offset corrected to {}s", self.time_offset);
        if self.clock_msg_id() <= self.last_msg_id {
            self.start_new_session();
        }
    }

    fn start_new_session(&mut self) {
        let mut rnd = [0u8; 8];
        getrandom::getrandom(&mut rnd).expect("getrandom");
        self.previous_session_id = Some(self.session_id);
        self.session_id = i64::from_le_bytes(rnd);
        self.sequence = 0;
        self.last_msg_id = 0;
        self.last_inbound_seq = None;
        log::info!("[strata] clock moved back, switched to session {:#x}", self.session_id);
    }

    /// Record the sequence value of a content-related inbound message.
    pub fn note_inbound_seq(&mut self, seq_no: i32) {
        if self.last_inbound_seq.is_none_or(|last| seq_no > last) {
            self.last_inbound_seq = Some(seq_no);
        }
    }

    /// Highest content-related inbound sequence value seen so far.
    pub fn last_inbound_seq(&self) -> Option<i32> {
        self.last_inbound_seq
    }

    /// Encrypt `message` as the client.
    pub fn encode(&self, message: &Message) -> Vec<u8> {
        self.encode_as(message, Side::Client)
    }

    /// Encrypt `message` as `side`.
    ///
    /// Layout of the plaintext before encryption:
    /// ```text
    /// salt:       i64
    /// session_id: i64
    /// msg_id:     i64
    /// seq_no:     i32
    /// body_len:   i32
    /// body:       [u8; body_len]
    /// ```
    pub fn encode_as(&self, message: &Message, side: Side) -> Vec<u8> {
        let inner_len = PLAINTEXT_HEADER_LEN + message.body.len();
        let mut buf = DequeBuffer::with_capacity(inner_len + strata_crypto::MAX_PADDING, strata_crypto::ENVELOPE_HEADER_LEN);
        buf.extend(self.salt.to_le_bytes());
        buf.extend(self.session_id.to_le_bytes());
        buf.extend(message.msg_id.0.to_le_bytes());
        buf.extend(message.seq_no.to_le_bytes());
        buf.extend((message.body.len() as u32).to_le_bytes());
        buf.extend(message.body.iter().copied());

        encrypt_data_v2_with(&mut buf, &self.auth_key, side);
        buf.into_vec()
    }

    /// Decrypt a frame sent by the server.
    pub fn decode(&self, frame: &mut [u8]) -> Result<DecryptedMessage, DecryptError> {
        self.decode_from(frame, Side::Server)
    }

    /// Decrypt a frame produced by `from` and validate its header.
    ///
    /// A 4-byte frame is a transport error code, not a ciphertext.
    pub fn decode_from(&self, frame: &mut [u8], from: Side) -> Result<DecryptedMessage, DecryptError> {
        if frame.len() == 4 {
            return Err(DecryptError::Transport { code: le_i32(frame, 0) });
        }
        let plaintext = decrypt_data_v2_with(frame, &self.auth_key, from)?;
        if plaintext.len() < PLAINTEXT_HEADER_LEN {
            return Err(DecryptError::FrameTooShort);
        }

        let salt = le_i64(plaintext, 0);
        let session_id = le_i64(plaintext, 8);
        let msg_id = le_i64(plaintext, 16);
        let seq_no = le_i32(plaintext, 24);
        let declared = le_i32(plaintext, 28) as u32 as usize;

        if session_id != self.session_id && Some(session_id) != self.previous_session_id {
            return Err(DecryptError::SessionMismatch);
        }

        let available = plaintext.len() - PLAINTEXT_HEADER_LEN;
        let padding = available.checked_sub(declared);
        let plausible =
            padding.is_some_and(|p| (strata_crypto::MIN_PADDING..=strata_crypto::MAX_PADDING).contains(&p));
        if !plausible {
            return Err(DecryptError::InvalidLength { declared, available });
        }

        let body = plaintext[PLAINTEXT_HEADER_LEN..PLAINTEXT_HEADER_LEN + declared].to_vec();
        Ok(DecryptedMessage {
            salt,
            session_id,
            message: Message { msg_id: MsgId(msg_id), seq_no, body },
        })
    }

    /// The auth key this session encrypts with.
    pub fn auth_key(&self) -> &AuthKey {
        &self.auth_key
    }

    /// Return the current session_id.
    pub fn session_id(&self) -> i64 {
        self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> EncryptedSession {
        EncryptedSession::with_session_id(AuthKey::from_bytes([3u8; 256]), 1, 0, 42)
    }

    #[test]
    fn msg_ids_are_strictly_increasing_and_client_tagged() {
        let mut s = session();
        let mut last = MsgId(0);
        for _ in 0..10_000 {
            let id = s.next_msg_id();
            assert!(id > last);
            assert_eq!(id.0 % 4, 0);
            last = id;
        }
    }

    #[test]
    fn offset_is_applied_to_msg_ids() {
        let mut s = session();
        s.time_offset = 3600;
        let id = s.next_msg_id();
        let local = unix_now().as_secs() as i64;
        assert!((id.secs() - local - 3600).abs() <= 1);
    }

    #[test]
    fn seq_numbers() {
        let mut s = session();
        assert_eq!(s.next_seq_no(false), 0);
        assert_eq!(s.next_seq_no(true), 1);
        assert_eq!(s.next_seq_no(true), 3);
        assert_eq!(s.next_seq_no(false), 4);
        s.adjust_sequence(16);
        assert_eq!(s.next_seq_no(true), 37);
        s.adjust_sequence(-100);
        assert_eq!(s.next_seq_no(false), 0);
    }

    #[test]
    fn time_offset_from_server_id() {
        let mut s = session();
        let before = s.next_msg_id();
        let local = unix_now().as_secs() as i64;
        s.correct_time_offset(MsgId(((local + 120) << 32) | 1));
        assert!((s.time_offset - 120).abs() <= 1);
        assert_eq!(s.session_id(), 42);
        assert!(s.next_msg_id() > before);
    }

    #[test]
    fn clock_moved_back_starts_a_new_session() {
        let mut s = session();
        assert_eq!(s.next_seq_no(true), 1);
        let before = s.next_msg_id();
        let local = unix_now().as_secs() as i64;
        s.correct_time_offset(MsgId(((local - 100) << 32) | 1));

        assert!((s.time_offset + 100).abs() <= 1);
        assert_ne!(s.session_id(), 42);
        assert_eq!(s.next_seq_no(true), 1);
        assert_eq!(s.last_inbound_seq(), None);

        let mut last = s.next_msg_id();
        assert!(last.secs() < before.secs());
        for _ in 0..100 {
            let id = s.next_msg_id();
            assert!(id > last);
            last = id;
        }

        // Late answers in the replaced session still decode.
        let old = session();
        let mut frame = old.encode_as(&message(b"late".to_vec()), Side::Server);
        assert_eq!(s.decode_from(&mut frame, Side::Server).unwrap().session_id, 42);
    }

    fn message(body: Vec<u8>) -> Message {
        Message { msg_id: MsgId(((unix_now().as_secs() as i64) << 32) | 1), seq_no: 1, body }
    }

    #[test]
    fn unaligned_body_round_trips() {
        let s = session();
        let sent = message(b"0123456789".to_vec());
        let frame = s.encode_as(&sent, Side::Server);

        let mut decrypted = frame.clone();
        let out = s.decode_from(&mut decrypted, Side::Server).unwrap();
        assert_eq!(out.message, sent);
        assert_eq!(out.session_id, 42);
        assert_eq!(out.salt, 1);

        let plaintext = &decrypted[strata_crypto::ENVELOPE_HEADER_LEN..];
        assert_eq!(le_i64(plaintext, 8), 42);
        let key = s.auth_key().to_bytes();
        let large = strata_crypto::sha256!(&key[96..128], plaintext);
        assert_eq!(large[8..24], frame[8..24]);
    }

    #[test]
    fn frame_for_another_session_is_rejected() {
        let s = session();
        let other = EncryptedSession::with_session_id(AuthKey::from_bytes([3u8; 256]), 1, 0, 43);
        let mut frame = other.encode_as(&message(vec![0; 8]), Side::Server);
        assert_eq!(s.decode_from(&mut frame, Side::Server), Err(DecryptError::SessionMismatch));
    }

    fn frame_declaring(declared: u32, body: &[u8]) -> Vec<u8> {
        let s = session();
        let mut buf = DequeBuffer::with_capacity(64 + body.len(), strata_crypto::ENVELOPE_HEADER_LEN);
        buf.extend(s.salt.to_le_bytes());
        buf.extend(42i64.to_le_bytes());
        buf.extend((((unix_now().as_secs() as i64) << 32) | 1).to_le_bytes());
        buf.extend(1i32.to_le_bytes());
        buf.extend(declared.to_le_bytes());
        buf.extend(body.iter().copied());
        encrypt_data_v2_with(&mut buf, s.auth_key(), Side::Server);
        buf.into_vec()
    }

    #[test]
    fn implausible_lengths_are_rejected() {
        let s = session();

        let mut longer_than_frame = frame_declaring(4096, &[0; 16]);
        assert!(matches!(
            s.decode_from(&mut longer_than_frame, Side::Server),
            Err(DecryptError::InvalidLength { declared: 4096, .. })
        ));

        // Declaring 4 of 16 body bytes leaves at least 12 + 12 bytes of padding,
        // which is fine; declaring 0 of 1100 leaves too much.
        let mut short_declared = frame_declaring(4, &[0; 16]);
        assert!(s.decode_from(&mut short_declared, Side::Server).is_ok());
        let mut huge_padding = frame_declaring(0, &[0; 1100]);
        assert!(matches!(
            s.decode_from(&mut huge_padding, Side::Server),
            Err(DecryptError::InvalidLength { declared: 0, .. })
        ));
    }

    #[test]
    fn four_byte_frame_is_transport_code() {
        let s = session();
        let mut frame = (-404i32).to_le_bytes();
        assert_eq!(s.decode(&mut frame), Err(DecryptError::Transport { code: -404 }));
    }
}
