//! Message identifiers and the envelope every MTProto message travels in.

use std::fmt;

use strata_tl::types::ContainerMessage;

/// Bytes an envelope adds in front of its body: `msg_id`, `seqno`, `bytes`.
pub const ENVELOPE_HEADER_LEN: usize = 8 + 4 + 4;

/// A 64-bit MTProto message identifier.
///
/// The upper 32 bits carry Unix seconds (server time), the lower 32 bits a
/// fraction of the second.  Client ids are divisible by 4; server ids are
/// odd (`≡ 1` for responses, `≡ 3` for server-initiated messages).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MsgId(pub i64);

impl MsgId {
    /// Unix seconds encoded in the id.
    pub fn secs(self) -> i64 {
        self.0 >> 32
    }

    /// True for ids the server may legitimately send.
    pub fn is_server(self) -> bool {
        self.0 & 1 == 1
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An envelope: id, sequence value and TL-serialized body.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Unique identifier for this message.
    pub msg_id: MsgId,
    /// Odd for content-related messages, even otherwise.
    pub seq_no: i32,
    /// The serialized TL body (constructor ID + fields).
    pub body: Vec<u8>,
}

impl Message {
    /// Whether the peer must acknowledge this message.
    pub fn is_content_related(&self) -> bool {
        self.seq_no & 1 == 1
    }

    /// Size of this message inside a container.
    pub fn wire_len(&self) -> usize {
        ENVELOPE_HEADER_LEN + self.body.len()
    }
}

impl From<ContainerMessage> for Message {
    fn from(m: ContainerMessage) -> Self {
        Self { msg_id: MsgId(m.msg_id), seq_no: m.seqno, body: m.body }
    }
}

impl From<Message> for ContainerMessage {
    fn from(m: Message) -> Self {
        Self { msg_id: m.msg_id.0, seqno: m.seq_no, body: m.body }
    }
}
