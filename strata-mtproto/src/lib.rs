//! MTProto session state, frame codec and message packing.
//!
//! This crate handles:
//! * Message ids and sequence numbers ([`EncryptedSession`])
//! * MTProto 2.0 frame encoding and decoding
//! * Packing requests into containers and unpacking everything the server
//!   sends back ([`Mtp`])
//! * Stream framings (Abridged, Intermediate, Full)
//!
//! It performs no I/O: bring your own socket.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod encrypted;
pub mod message;
pub mod mtp;
pub mod transport;

pub use encrypted::{DecryptError, DecryptedMessage, EncryptedSession};
pub use message::{Message, MsgId};
pub use mtp::{Deserialization, DeserializeError, Mtp, MtpConfig, RequestError};
pub use transport::{Abridged, Framing, FramingError, Full, Intermediate, UnpackedOffset};
