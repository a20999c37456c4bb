//! TL serialization and the reduced schema used by the strata protocol engine.
//!
//! The full API schema is an external collaborator of the engine.  This crate
//! only carries the primitive [`Serializable`] / [`Deserializable`] machinery
//! and the handful of constructors the engine itself has to understand:
//!
//! | Module        | Contents                                                   |
//! |---------------|------------------------------------------------------------|
//! | [`types`]     | Concrete constructors (bare types) as `struct`s            |
//! | [`functions`] | RPC functions as `struct`s implementing [`RemoteCall`]     |
//! | [`enums`]     | Boxed types as `enum`s implementing [`Deserializable`]     |
//!
//! MTProto service constructors (`rpc_result`, `bad_server_salt`,
//! `msgs_ack`, …) follow the wire layout exactly.  API constructors
//! (`updates`, `message`, `user`, …) keep their real constructor IDs but only
//! carry the fields the update sequencer and entity cache read.
//!
//! # Raw usage
//!
//! ```rust
//! use strata_tl::{functions, Serializable};
//!
//! let req = functions::updates::GetState {};
//! let bytes = req.to_bytes();
//! assert_eq!(&bytes[..4], &0xedd4882au32.to_le_bytes());
//! ```

#![deny(unsafe_code)]
#![allow(clippy::large_enum_variant)]

#[macro_use]
mod macros;

pub mod deserialize;
pub mod enums;
pub mod functions;
pub mod serialize;
pub mod types;

pub use deserialize::{Cursor, Deserializable, VECTOR_ID};
pub use serialize::Serializable;

/// Bare `vector` (lowercase), as opposed to the boxed `Vector`.
///
/// Used in rare cases where a length-prefixed list is sent without the usual
/// `0x1cb5c415` constructor ID header.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVec<T>(pub Vec<T>);

/// Opaque blob of bytes that should be passed through without interpretation.
///
/// Returned by functions whose response type is generic (e.g. `X`).
#[derive(Clone, Debug, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(v: Vec<u8>) -> Self { Self(v) }
}

impl Serializable for Blob {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.0.iter().copied());
    }
}

impl Deserializable for Blob {
    fn deserialize(buf: deserialize::Buffer) -> deserialize::Result<Self> {
        let mut out = Vec::new();
        buf.read_to_end(&mut out);
        Ok(Self(out))
    }
}

// ─── Core traits ──────────────────────────────────────────────────────────────

/// Every schema type has a unique 32-bit constructor ID.
pub trait Identifiable {
    /// The constructor ID as specified in the TL schema.
    const CONSTRUCTOR_ID: u32;
}

/// Marks a function type that can be sent to the server as an RPC call.
///
/// `Return` is the type the server will respond with.
pub trait RemoteCall: Serializable {
    /// The deserialized response type.
    type Return: Deserializable;
}

/// Read the leading constructor ID of a serialized boxed object.
pub fn peek_constructor(bytes: &[u8]) -> Option<u32> {
    bytes.get(..4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Returns the TL name for a constructor ID this crate knows about.
pub fn name_for_id(id: u32) -> Option<&'static str> {
    use types::*;
    let name = match id {
        RpcResult::CONSTRUCTOR_ID          => "rpc_result",
        RpcError::CONSTRUCTOR_ID           => "rpc_error",
        MsgContainer::CONSTRUCTOR_ID       => "msg_container",
        GzipPacked::CONSTRUCTOR_ID         => "gzip_packed",
        Pong::CONSTRUCTOR_ID               => "pong",
        BadServerSalt::CONSTRUCTOR_ID      => "bad_server_salt",
        BadMsgNotification::CONSTRUCTOR_ID => "bad_msg_notification",
        NewSessionCreated::CONSTRUCTOR_ID  => "new_session_created",
        MsgsAck::CONSTRUCTOR_ID            => "msgs_ack",
        MsgsStateReq::CONSTRUCTOR_ID       => "msgs_state_req",
        MsgsStateInfo::CONSTRUCTOR_ID      => "msgs_state_info",
        MsgDetailedInfo::CONSTRUCTOR_ID    => "msg_detailed_info",
        MsgNewDetailedInfo::CONSTRUCTOR_ID => "msg_new_detailed_info",
        UpdatesTooLong::CONSTRUCTOR_ID     => "updatesTooLong",
        UpdateShortMessage::CONSTRUCTOR_ID => "updateShortMessage",
        UpdateShortChatMessage::CONSTRUCTOR_ID => "updateShortChatMessage",
        UpdateShort::CONSTRUCTOR_ID        => "updateShort",
        UpdatesCombined::CONSTRUCTOR_ID    => "updatesCombined",
        Updates::CONSTRUCTOR_ID            => "updates",
        _ => return None,
    };
    Some(name)
}
