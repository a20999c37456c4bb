//! Sans-IO message packer/unpacker.
//!
//! [`Mtp`] turns request bodies into encrypted frames and encrypted frames
//! back into request results and pushed updates.  It never touches a socket:
//! the caller pushes bodies, calls [`Mtp::finalize`] to get the bytes to
//! write, and feeds every frame it reads to [`Mtp::deserialize`].
//!
//! Besides unpacking results, it answers the server's service messages:
//! acknowledgements are queued for every content-related inbound message,
//! `msgs_state_req` gets a `msgs_state_info` reply, salt and clock corrections
//! are applied to the session, and requests the server asks to resend are
//! reported back as [`RequestError::Retry`].

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::io::Read;
use std::mem;

use strata_tl::{Deserializable, Identifiable, RawVec, Serializable, enums, types};

use crate::encrypted::{DecryptError, EncryptedSession, unix_now};
use crate::message::{ENVELOPE_HEADER_LEN, Message, MsgId};

/// Maximum ids in a single `msgs_ack`.
const MAX_ACKS_PER_MESSAGE: usize = 8192;

/// Number of recent inbound message ids remembered for replay detection
/// and `msgs_state_req` answers.
const RECENT_INBOUND_WINDOW: usize = 1000;

/// Ids more than this many seconds ahead of the server clock are "too high".
const MAX_FUTURE_SECS: i64 = 30;

/// Ceilings for batching several messages into one container.
#[derive(Clone, Debug, PartialEq)]
pub struct MtpConfig {
    /// Maximum number of messages packed into one container.
    pub max_container_messages: usize,
    /// Maximum total size of the container's members, headers included.
    pub max_container_bytes: usize,
}

impl Default for MtpConfig {
    fn default() -> Self {
        Self {
            max_container_messages: 1020,
            max_container_bytes: 1_044_456,
        }
    }
}

/// Why a request did not produce a result.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestError {
    /// The server answered with `rpc_error`.
    Rpc {
        /// Numeric error code (e.g. 420).
        code: i32,
        /// Error message (e.g. `FLOOD_WAIT_30`).
        message: String,
    },
    /// The server rejected the message with a non-recoverable
    /// `bad_msg_notification` code.
    BadMessage {
        /// The notification's error code.
        code: i32,
    },
    /// The message must be sent again with a fresh id.
    Retry,
    /// The result arrived but could not be unpacked.
    Deserialize(String),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc { code, message } => write!(f, "rpc error {code}: {message}"),
            Self::BadMessage { code } => write!(f, "bad message (code {code})"),
            Self::Retry => write!(f, "message must be resent"),
            Self::Deserialize(reason) => write!(f, "undecodable result: {reason}"),
        }
    }
}

impl std::error::Error for RequestError {}

/// A frame could not be processed at all.
#[derive(Clone, Debug, PartialEq)]
pub enum DeserializeError {
    /// The server sent a 4-byte transport error code.
    Transport {
        /// Negative error code, e.g. `-404`.
        code: i32,
    },
    /// Decryption or header validation failed.
    Decrypt(DecryptError),
}

impl fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { code } => write!(f, "transport error {code}"),
            Self::Decrypt(e) => write!(f, "decrypt: {e}"),
        }
    }
}

impl std::error::Error for DeserializeError {}

impl From<DecryptError> for DeserializeError {
    fn from(e: DecryptError) -> Self {
        match e {
            DecryptError::Transport { code } => Self::Transport { code },
            e => Self::Decrypt(e),
        }
    }
}

/// Everything one inbound frame produced.
#[derive(Debug, Default, PartialEq)]
pub struct Deserialization {
    /// Results keyed by the id of the request they answer, in arrival order.
    pub rpc_results: Vec<(MsgId, Result<Vec<u8>, RequestError>)>,
    /// Serialized `Updates` objects pushed by the server.
    pub updates: Vec<Vec<u8>>,
}

/// Message packer/unpacker over an [`EncryptedSession`].
pub struct Mtp {
    session: EncryptedSession,
    config: MtpConfig,
    queue: Vec<Message>,
    queued_bytes: usize,
    pending_ack: Vec<i64>,
    state_replies: VecDeque<Vec<u8>>,
    containers: HashMap<MsgId, Vec<MsgId>>,
    recent_inbound: BTreeSet<i64>,
    out: Deserialization,
}

impl Mtp {
    /// Wrap a session.
    pub fn new(session: EncryptedSession, config: MtpConfig) -> Self {
        Self {
            session,
            config,
            queue: Vec::new(),
            queued_bytes: 0,
            pending_ack: Vec::new(),
            state_replies: VecDeque::new(),
            containers: HashMap::new(),
            recent_inbound: BTreeSet::new(),
            out: Deserialization::default(),
        }
    }

    /// The protocol state.
    pub fn session(&self) -> &EncryptedSession {
        &self.session
    }

    /// Mutable access to the protocol state.
    pub fn session_mut(&mut self) -> &mut EncryptedSession {
        &mut self.session
    }

    /// Queue a content-related request body for the next frame.
    ///
    /// Returns the message id assigned to it, or `None` if the next frame is
    /// full; in that case call [`Mtp::finalize`] and push again.
    pub fn push(&mut self, body: &[u8]) -> Option<MsgId> {
        self.push_with(body, true)
    }

    /// Queue a body, choosing whether it is content-related.
    pub fn push_with(&mut self, body: &[u8], content_related: bool) -> Option<MsgId> {
        let len = ENVELOPE_HEADER_LEN + body.len();
        if !self.queue.is_empty()
            && (self.queue.len() >= self.config.max_container_messages
                || self.queued_bytes + len > self.config.max_container_bytes)
        {
            return None;
        }
        let msg_id = self.session.next_msg_id();
        let seq_no = self.session.next_seq_no(content_related);
        self.queue.push(Message { msg_id, seq_no, body: body.to_vec() });
        self.queued_bytes += len;
        Some(msg_id)
    }

    /// Whether acknowledgements or replies are waiting to be sent.
    pub fn has_pending_service(&self) -> bool {
        !self.pending_ack.is_empty() || !self.state_replies.is_empty()
    }

    /// Encrypt everything queued so far into one frame.
    ///
    /// Pending acknowledgements and state replies ride along.  A single
    /// message is sent as is; several are wrapped in a container whose id is
    /// allocated after its members'.  Returns `None` if there is nothing to
    /// send.
    pub fn finalize(&mut self) -> Option<Vec<u8>> {
        self.append_service_messages();
        if self.queue.is_empty() {
            return None;
        }
        let mut messages = mem::take(&mut self.queue);
        self.queued_bytes = 0;

        let message = if messages.len() == 1 {
            messages.pop()?
        } else {
            let members: Vec<MsgId> = messages
                .iter()
                .filter(|m| m.is_content_related())
                .map(|m| m.msg_id)
                .collect();
            let count = messages.len();
            let container = types::MsgContainer {
                messages: RawVec(messages.into_iter().map(Into::into).collect()),
            };
            let mut body = Vec::new();
            types::MsgContainer::CONSTRUCTOR_ID.serialize(&mut body);
            container.serialize(&mut body);

            let msg_id = self.session.next_msg_id();
            let seq_no = self.session.next_seq_no(false);
            log::debug!("[strata] packed {count} messages into container {msg_id}");
            if !members.is_empty() {
                self.containers.insert(msg_id, members);
            }
            Message { msg_id, seq_no, body }
        };
        Some(self.session.encode(&message))
    }

    /// Forget container bookkeeping and anything queued but not finalized.
    ///
    /// Called when the connection is replaced; the caller resends whatever
    /// is still in flight.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.queued_bytes = 0;
        self.containers.clear();
    }

    /// Decrypt and process one inbound frame.
    pub fn deserialize(&mut self, frame: &mut [u8]) -> Result<Deserialization, DeserializeError> {
        let decrypted = self.session.decode(frame)?;
        self.process_message(decrypted.message);
        Ok(mem::take(&mut self.out))
    }

    fn append_service_messages(&mut self) {
        while let Some(body) = self.state_replies.pop_front() {
            if self.push_with(&body, false).is_none() {
                self.state_replies.push_front(body);
                break;
            }
        }
        if self.pending_ack.is_empty() {
            return;
        }
        let take = self.pending_ack.len().min(MAX_ACKS_PER_MESSAGE);
        let msg_ids: Vec<i64> = self.pending_ack[..take].to_vec();
        let body = enums::MsgsAck::from(types::MsgsAck { msg_ids }).to_bytes();
        if self.push_with(&body, false).is_some() {
            self.pending_ack.drain(..take);
        }
    }

    // ─── Inbound ─────────────────────────────────────────────────────────────

    fn accept_inbound(&mut self, msg_id: MsgId) -> bool {
        if !msg_id.is_server() {
            log::warn!("[strata] dropping message with client-tagged id {msg_id}");
            return false;
        }
        if self.recent_inbound.contains(&msg_id.0) {
            log::warn!("[strata] dropping replayed message {msg_id}");
            return false;
        }
        let window_full = self.recent_inbound.len() >= RECENT_INBOUND_WINDOW;
        if window_full && self.recent_inbound.first().is_some_and(|&oldest| msg_id.0 < oldest) {
            log::warn!("[strata] dropping message {msg_id} older than the replay window");
            return false;
        }
        self.recent_inbound.insert(msg_id.0);
        if self.recent_inbound.len() > RECENT_INBOUND_WINDOW {
            self.recent_inbound.pop_first();
        }
        true
    }

    fn process_message(&mut self, message: Message) {
        if !self.accept_inbound(message.msg_id) {
            return;
        }
        if message.is_content_related() {
            self.pending_ack.push(message.msg_id.0);
            self.session.note_inbound_seq(message.seq_no);
        }
        self.process_body(message.msg_id, message.body);
    }

    fn process_body(&mut self, msg_id: MsgId, body: Vec<u8>) {
        let Some(id) = strata_tl::peek_constructor(&body) else {
            log::warn!("[strata] message {msg_id} has an empty body");
            return;
        };
        match id {
            types::RpcResult::CONSTRUCTOR_ID => self.handle_rpc_result(&body),
            types::MsgContainer::CONSTRUCTOR_ID => self.handle_container(&body),
            types::GzipPacked::CONSTRUCTOR_ID => {
                if let Some(inner) = decode::<types::GzipPacked>(&body).and_then(|g| inflate(&g.packed_data)) {
                    self.process_body(msg_id, inner);
                }
            }
            types::Pong::CONSTRUCTOR_ID => {
                if let Some(pong) = decode::<types::Pong>(&body) {
                    self.resolve(MsgId(pong.msg_id), Ok(body));
                }
            }
            types::BadServerSalt::CONSTRUCTOR_ID => {
                if let Some(bad) = decode::<types::BadServerSalt>(&body) {
                    log::debug!("[strata] server salt replaced for message {}", bad.bad_msg_id);
                    self.session.salt = bad.new_server_salt;
                    self.reject(MsgId(bad.bad_msg_id), RequestError::Retry);
                }
            }
            types::BadMsgNotification::CONSTRUCTOR_ID => {
                if let Some(bad) = decode::<types::BadMsgNotification>(&body) {
                    self.handle_bad_notification(msg_id, bad);
                }
            }
            types::NewSessionCreated::CONSTRUCTOR_ID => {
                if let Some(created) = decode::<types::NewSessionCreated>(&body) {
                    log::info!("[strata] new session created (first_msg_id={})", created.first_msg_id);
                }
            }
            types::MsgsAck::CONSTRUCTOR_ID => {
                if let Some(ack) = decode::<types::MsgsAck>(&body) {
                    log::debug!("[strata] server acknowledged {} messages", ack.msg_ids.len());
                }
            }
            types::MsgDetailedInfo::CONSTRUCTOR_ID => {
                if let Some(info) = decode::<types::MsgDetailedInfo>(&body) {
                    self.pending_ack.push(info.answer_msg_id);
                }
            }
            types::MsgNewDetailedInfo::CONSTRUCTOR_ID => {
                if let Some(info) = decode::<types::MsgNewDetailedInfo>(&body) {
                    self.pending_ack.push(info.answer_msg_id);
                }
            }
            types::MsgsStateReq::CONSTRUCTOR_ID => {
                if let Some(req) = decode::<types::MsgsStateReq>(&body) {
                    self.answer_state_request(msg_id, &req.msg_ids);
                }
            }
            types::UpdatesTooLong::CONSTRUCTOR_ID
            | types::UpdateShortMessage::CONSTRUCTOR_ID
            | types::UpdateShortChatMessage::CONSTRUCTOR_ID
            | types::UpdateShort::CONSTRUCTOR_ID
            | types::UpdatesCombined::CONSTRUCTOR_ID
            | types::Updates::CONSTRUCTOR_ID => self.out.updates.push(body),
            other => {
                let name = strata_tl::name_for_id(other).unwrap_or("unknown");
                log::warn!("[strata] dropping unhandled {name} ({other:#010x}) in message {msg_id}");
            }
        }
    }

    /// Resolve the request an `rpc_result` answers.  Once `req_msg_id` is
    /// readable the request is always resolved, with an error if the payload
    /// is broken.
    fn handle_rpc_result(&mut self, body: &[u8]) {
        let Some(res) = decode::<types::RpcResult>(body) else { return };
        let req_msg_id = MsgId(res.req_msg_id);
        let mut payload = res.result.0;

        if strata_tl::peek_constructor(&payload) == Some(types::GzipPacked::CONSTRUCTOR_ID) {
            match decode::<types::GzipPacked>(&payload).and_then(|g| inflate(&g.packed_data)) {
                Some(inner) => payload = inner,
                None => {
                    let reason = "gzip_packed result did not inflate".to_owned();
                    self.resolve(req_msg_id, Err(RequestError::Deserialize(reason)));
                    return;
                }
            }
        }

        if strata_tl::peek_constructor(&payload) == Some(types::RpcError::CONSTRUCTOR_ID) {
            let result = match decode::<types::RpcError>(&payload) {
                Some(err) => RequestError::Rpc { code: err.error_code, message: err.error_message },
                None => RequestError::Deserialize("truncated rpc_error".to_owned()),
            };
            self.resolve(req_msg_id, Err(result));
            return;
        }
        self.resolve(req_msg_id, Ok(payload));
    }

    fn handle_container(&mut self, body: &[u8]) {
        let Some(container) = decode::<types::MsgContainer>(body) else { return };
        let mut messages: Vec<Message> = container.messages.0.into_iter().map(Message::from).collect();
        messages.sort_by_key(|m| m.seq_no);
        for message in messages {
            self.process_message(message);
        }
    }

    fn handle_bad_notification(&mut self, msg_id: MsgId, bad: types::BadMsgNotification) {
        let target = MsgId(bad.bad_msg_id);
        match bad.error_code {
            16 | 17 => {
                log::warn!("[strata] message {target} rejected for clock skew (code {})", bad.error_code);
                self.session.correct_time_offset(msg_id);
                self.reject(target, RequestError::Retry);
            }
            18 | 19 | 20 => {
                log::debug!("[strata] resending message {target} (code {})", bad.error_code);
                self.reject(target, RequestError::Retry);
            }
            32 => {
                log::warn!("[strata] msg_seqno too low for {target}, advancing sequence");
                self.session.adjust_sequence(16);
                self.reject(target, RequestError::Retry);
            }
            33 => {
                log::warn!("[strata] msg_seqno too high for {target}, rewinding sequence");
                self.session.adjust_sequence(-16);
                self.reject(target, RequestError::Retry);
            }
            34 | 35 | 64 => {
                log::error!("[strata] message {target} rejected with code {}", bad.error_code);
                self.reject(target, RequestError::BadMessage { code: bad.error_code });
            }
            48 => log::debug!("[strata] ignoring bad salt notice for {target}"),
            code => {
                log::warn!("[strata] unknown bad_msg_notification code {code} for {target}, resending");
                self.reject(target, RequestError::Retry);
            }
        }
    }

    fn answer_state_request(&mut self, req_msg_id: MsgId, msg_ids: &[i64]) {
        let now = unix_now().as_secs() as i64 + self.session.time_offset as i64;
        let info: Vec<u8> = msg_ids.iter().map(|&id| self.inbound_status(id, now)).collect();
        let reply = enums::MsgsStateInfo::from(types::MsgsStateInfo { req_msg_id: req_msg_id.0, info });
        self.state_replies.push_back(reply.to_bytes());
    }

    fn inbound_status(&self, msg_id: i64, now: i64) -> u8 {
        let window_full = self.recent_inbound.len() >= RECENT_INBOUND_WINDOW;
        if self.recent_inbound.contains(&msg_id) {
            4
        } else if window_full && self.recent_inbound.first().is_some_and(|&oldest| msg_id < oldest) {
            1
        } else if MsgId(msg_id).secs() > now + MAX_FUTURE_SECS {
            3
        } else {
            2
        }
    }

    fn forget_member(&mut self, msg_id: MsgId) {
        self.containers.retain(|_, members| {
            members.retain(|m| *m != msg_id);
            !members.is_empty()
        });
    }

    fn resolve(&mut self, msg_id: MsgId, result: Result<Vec<u8>, RequestError>) {
        self.forget_member(msg_id);
        self.out.rpc_results.push((msg_id, result));
    }

    /// Report `error` for `msg_id`, or for every member if it names a container.
    fn reject(&mut self, msg_id: MsgId, error: RequestError) {
        match self.containers.remove(&msg_id) {
            Some(members) => {
                log::debug!("[strata] container {msg_id} affects {} requests", members.len());
                self.out.rpc_results.extend(members.into_iter().map(|m| (m, Err(error.clone()))));
            }
            None => self.resolve(msg_id, Err(error)),
        }
    }
}

/// Deserialize the bare object behind a boxed body's constructor id.
fn decode<T: Deserializable>(body: &[u8]) -> Option<T> {
    match T::from_bytes(&body[4..]) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("[strata] failed to decode {}: {e}", std::any::type_name::<T>());
            None
        }
    }
}

/// Inflate a `gzip_packed` payload (gzip, with a zlib fallback).
fn inflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    if flate2::read::GzDecoder::new(data).read_to_end(&mut out).is_ok() && !out.is_empty() {
        return Some(out);
    }
    out.clear();
    match flate2::read::ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Some(out),
        Err(e) => {
            log::warn!("[strata] failed to inflate gzip_packed: {e}");
            None
        }
    }
}
