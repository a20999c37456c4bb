//! Bare constructors.
//!
//! MTProto service constructors match the wire layout exactly.  API
//! constructors marked *reduced* keep their constructor ID but only the fields
//! the protocol engine reads; the full schema lives outside this workspace.

use crate::deserialize::{Buffer, Result};
use crate::{Blob, Deserializable, RawVec, Serializable, enums};

// ─── MTProto service constructors ────────────────────────────────────────────

tl_struct! {
    /// [`rpc_result`](https://core.telegram.org/mtproto/service_messages)
    ///
    /// `result` is left undecoded; its type depends on the request.
    pub struct RpcResult = 0xf35c6d01 {
        pub req_msg_id: i64,
        pub result: Blob,
    }
}

tl_struct! {
    /// [`rpc_error`](https://core.telegram.org/mtproto/service_messages)
    pub struct RpcError = 0x2144ca19 {
        pub error_code: i32,
        pub error_message: String,
    }
}

/// One entry of a [`MsgContainer`]: `message msg_id:long seqno:int bytes:int body:Object`.
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct ContainerMessage {
    pub msg_id: i64,
    pub seqno: i32,
    pub body: Vec<u8>,
}

impl Serializable for ContainerMessage {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.msg_id.serialize(buf);
        self.seqno.serialize(buf);
        (self.body.len() as i32).serialize(buf);
        buf.extend(self.body.iter().copied());
    }
}

impl Deserializable for ContainerMessage {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let msg_id = i64::deserialize(buf)?;
        let seqno = i32::deserialize(buf)?;
        let len = buf.read_len(1)?;
        if len % 4 != 0 {
            return Err(crate::deserialize::Error::InvalidLength { len: len as i64 });
        }
        let body = buf.read_slice(len)?.to_vec();
        Ok(Self { msg_id, seqno, body })
    }
}

tl_struct! {
    /// [`msg_container`](https://core.telegram.org/mtproto/service_messages#simple-container)
    pub struct MsgContainer = 0x73f1f8dc {
        pub messages: RawVec<ContainerMessage>,
    }
}

tl_struct! {
    /// [`gzip_packed`](https://core.telegram.org/mtproto/service_messages#packed-object)
    pub struct GzipPacked = 0x3072cfa1 {
        pub packed_data: Vec<u8>,
    }
}

tl_struct! {
    /// [`pong`](https://core.telegram.org/mtproto/service_messages#ping-messages-pingpong)
    pub struct Pong = 0x347773c5 {
        pub msg_id: i64,
        pub ping_id: i64,
    }
}

tl_struct! {
    /// [`bad_server_salt`](https://core.telegram.org/mtproto/service_messages_about_messages#notice-of-ignored-error-message)
    pub struct BadServerSalt = 0xedab447b {
        pub bad_msg_id: i64,
        pub bad_msg_seqno: i32,
        pub error_code: i32,
        pub new_server_salt: i64,
    }
}

tl_struct! {
    /// [`bad_msg_notification`](https://core.telegram.org/mtproto/service_messages_about_messages#notice-of-ignored-error-message)
    pub struct BadMsgNotification = 0xa7eff811 {
        pub bad_msg_id: i64,
        pub bad_msg_seqno: i32,
        pub error_code: i32,
    }
}

tl_struct! {
    /// [`new_session_created`](https://core.telegram.org/mtproto/service_messages#new-session-creation-notification)
    pub struct NewSessionCreated = 0x9ec20908 {
        pub first_msg_id: i64,
        pub unique_id: i64,
        pub server_salt: i64,
    }
}

tl_struct! {
    /// [`msgs_ack`](https://core.telegram.org/mtproto/service_messages_about_messages#acknowledgment-of-receipt)
    pub struct MsgsAck = 0x62d6b459 {
        pub msg_ids: Vec<i64>,
    }
}

tl_struct! {
    /// [`msgs_state_req`](https://core.telegram.org/mtproto/service_messages_about_messages#request-for-message-status-information)
    pub struct MsgsStateReq = 0xda69fb52 {
        pub msg_ids: Vec<i64>,
    }
}

tl_struct! {
    /// [`msgs_state_info`](https://core.telegram.org/mtproto/service_messages_about_messages#informational-message-regarding-status-of-messages)
    ///
    /// `info` holds one status byte per id of the request, in order.
    pub struct MsgsStateInfo = 0x04deb57d {
        pub req_msg_id: i64,
        pub info: Vec<u8>,
    }
}

tl_struct! {
    /// [`msg_detailed_info`](https://core.telegram.org/mtproto/service_messages_about_messages#extended-voluntary-communication-of-status-of-one-message)
    pub struct MsgDetailedInfo = 0x276d3ec6 {
        pub msg_id: i64,
        pub answer_msg_id: i64,
        pub bytes: i32,
        pub status: i32,
    }
}

tl_struct! {
    /// [`msg_new_detailed_info`](https://core.telegram.org/mtproto/service_messages_about_messages#extended-voluntary-communication-of-status-of-one-message)
    pub struct MsgNewDetailedInfo = 0x809db6df {
        pub answer_msg_id: i64,
        pub bytes: i32,
        pub status: i32,
    }
}

// ─── Peers ───────────────────────────────────────────────────────────────────

tl_struct! {
    /// [`peerUser`](https://core.telegram.org/constructor/peerUser)
    pub struct PeerUser = 0x59511722 {
        pub user_id: i64,
    }
}

tl_struct! {
    /// [`peerChat`](https://core.telegram.org/constructor/peerChat)
    pub struct PeerChat = 0x36c6019a {
        pub chat_id: i64,
    }
}

tl_struct! {
    /// [`peerChannel`](https://core.telegram.org/constructor/peerChannel)
    pub struct PeerChannel = 0xa2a5371e {
        pub channel_id: i64,
    }
}

tl_struct! {
    /// [`inputPeerEmpty`](https://core.telegram.org/constructor/inputPeerEmpty)
    pub struct InputPeerEmpty = 0x7f3b18ea {}
}

tl_struct! {
    /// [`inputPeerSelf`](https://core.telegram.org/constructor/inputPeerSelf)
    pub struct InputPeerSelf = 0x7da07ec9 {}
}

tl_struct! {
    /// [`inputPeerChat`](https://core.telegram.org/constructor/inputPeerChat)
    pub struct InputPeerChat = 0x35a95cb9 {
        pub chat_id: i64,
    }
}

tl_struct! {
    /// [`inputPeerUser`](https://core.telegram.org/constructor/inputPeerUser)
    pub struct InputPeerUser = 0xdde8a54c {
        pub user_id: i64,
        pub access_hash: i64,
    }
}

tl_struct! {
    /// [`inputPeerChannel`](https://core.telegram.org/constructor/inputPeerChannel)
    pub struct InputPeerChannel = 0x27bcbbfc {
        pub channel_id: i64,
        pub access_hash: i64,
    }
}

tl_struct! {
    /// [`inputUserEmpty`](https://core.telegram.org/constructor/inputUserEmpty)
    pub struct InputUserEmpty = 0xb98886cf {}
}

tl_struct! {
    /// [`inputUserSelf`](https://core.telegram.org/constructor/inputUserSelf)
    pub struct InputUserSelf = 0xf7c1b13f {}
}

tl_struct! {
    /// [`inputUser`](https://core.telegram.org/constructor/inputUser)
    pub struct InputUser = 0xf21158c6 {
        pub user_id: i64,
        pub access_hash: i64,
    }
}

tl_struct! {
    /// [`inputUserFromMessage`](https://core.telegram.org/constructor/inputUserFromMessage)
    pub struct InputUserFromMessage = 0x1da448e2 {
        pub peer: enums::InputPeer,
        pub msg_id: i32,
        pub user_id: i64,
    }
}

tl_struct! {
    /// [`inputChannelEmpty`](https://core.telegram.org/constructor/inputChannelEmpty)
    pub struct InputChannelEmpty = 0xee8c1e86 {}
}

tl_struct! {
    /// [`inputChannel`](https://core.telegram.org/constructor/inputChannel)
    pub struct InputChannel = 0xf35aec28 {
        pub channel_id: i64,
        pub access_hash: i64,
    }
}

tl_struct! {
    /// [`inputChannelFromMessage`](https://core.telegram.org/constructor/inputChannelFromMessage)
    pub struct InputChannelFromMessage = 0x5b934f9d {
        pub peer: enums::InputPeer,
        pub msg_id: i32,
        pub channel_id: i64,
    }
}

tl_struct! {
    /// [`channelMessagesFilterEmpty`](https://core.telegram.org/constructor/channelMessagesFilterEmpty)
    pub struct ChannelMessagesFilterEmpty = 0x94d42ee7 {}
}

// ─── Users and chats ─────────────────────────────────────────────────────────

tl_struct! {
    /// [`userEmpty`](https://core.telegram.org/constructor/userEmpty)
    pub struct UserEmpty = 0xd3bc4b7a {
        pub id: i64,
    }
}

/// [`user`](https://core.telegram.org/constructor/user) (reduced)
///
/// ```tl
/// user#215c4438 flags:# min:flags.20?true id:long access_hash:flags.0?long first_name:flags.1?string = User;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct User {
    pub min: bool,
    pub id: i64,
    pub access_hash: Option<i64>,
    pub first_name: Option<String>,
}

impl crate::Identifiable for User {
    const CONSTRUCTOR_ID: u32 = 0x215c4438;
}

impl Serializable for User {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (if self.min { 1u32 << 20 } else { 0 }
            | if self.access_hash.is_some() { 1u32 << 0 } else { 0 }
            | if self.first_name.is_some() { 1u32 << 1 } else { 0 }).serialize(buf);
        self.id.serialize(buf);
        if let Some(ref v) = self.access_hash { v.serialize(buf); }
        if let Some(ref v) = self.first_name { v.serialize(buf); }
    }
}

impl Deserializable for User {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let _flags = u32::deserialize(buf)?;
        let min = (_flags & (1 << 20)) != 0;
        let id = i64::deserialize(buf)?;
        let access_hash = if (_flags & (1 << 0)) != 0 { Some(i64::deserialize(buf)?) } else { None };
        let first_name = if (_flags & (1 << 1)) != 0 { Some(String::deserialize(buf)?) } else { None };
        Ok(Self { min, id, access_hash, first_name })
    }
}

tl_struct! {
    /// [`chatEmpty`](https://core.telegram.org/constructor/chatEmpty)
    pub struct ChatEmpty = 0x29562865 {
        pub id: i64,
    }
}

tl_struct! {
    /// [`chat`](https://core.telegram.org/constructor/chat) (reduced)
    pub struct Chat = 0x41cbf256 {
        pub id: i64,
        pub title: String,
    }
}

/// [`channel`](https://core.telegram.org/constructor/channel) (reduced)
///
/// ```tl
/// channel#0aadfc8f flags:# min:flags.12?true id:long access_hash:flags.13?long title:string = Chat;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct Channel {
    pub min: bool,
    pub id: i64,
    pub access_hash: Option<i64>,
    pub title: String,
}

impl crate::Identifiable for Channel {
    const CONSTRUCTOR_ID: u32 = 0x0aadfc8f;
}

impl Serializable for Channel {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (if self.min { 1u32 << 12 } else { 0 }
            | if self.access_hash.is_some() { 1u32 << 13 } else { 0 }).serialize(buf);
        self.id.serialize(buf);
        if let Some(ref v) = self.access_hash { v.serialize(buf); }
        self.title.serialize(buf);
    }
}

impl Deserializable for Channel {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let _flags = u32::deserialize(buf)?;
        let min = (_flags & (1 << 12)) != 0;
        let id = i64::deserialize(buf)?;
        let access_hash = if (_flags & (1 << 13)) != 0 { Some(i64::deserialize(buf)?) } else { None };
        let title = String::deserialize(buf)?;
        Ok(Self { min, id, access_hash, title })
    }
}

tl_struct! {
    /// [`channelForbidden`](https://core.telegram.org/constructor/channelForbidden) (reduced)
    pub struct ChannelForbidden = 0x17d493d5 {
        pub id: i64,
        pub access_hash: i64,
        pub title: String,
    }
}

// ─── Messages ────────────────────────────────────────────────────────────────

/// [`messageEmpty`](https://core.telegram.org/constructor/messageEmpty)
///
/// ```tl
/// messageEmpty#90a6ca84 flags:# id:int peer_id:flags.0?Peer = Message;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct MessageEmpty {
    pub id: i32,
    pub peer_id: Option<enums::Peer>,
}

impl crate::Identifiable for MessageEmpty {
    const CONSTRUCTOR_ID: u32 = 0x90a6ca84;
}

impl Serializable for MessageEmpty {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (if self.peer_id.is_some() { 1u32 << 0 } else { 0 }).serialize(buf);
        self.id.serialize(buf);
        if let Some(ref v) = self.peer_id { v.serialize(buf); }
    }
}

impl Deserializable for MessageEmpty {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let _flags = u32::deserialize(buf)?;
        let id = i32::deserialize(buf)?;
        let peer_id = if (_flags & (1 << 0)) != 0 { Some(enums::Peer::deserialize(buf)?) } else { None };
        Ok(Self { id, peer_id })
    }
}

/// [`message`](https://core.telegram.org/constructor/message) (reduced)
///
/// ```tl
/// message#94345242 flags:# out:flags.1?true id:int from_id:flags.8?Peer peer_id:Peer date:int message:string = Message;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct Message {
    pub out: bool,
    pub id: i32,
    pub from_id: Option<enums::Peer>,
    pub peer_id: enums::Peer,
    pub date: i32,
    pub message: String,
}

impl crate::Identifiable for Message {
    const CONSTRUCTOR_ID: u32 = 0x94345242;
}

impl Serializable for Message {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (if self.out { 1u32 << 1 } else { 0 }
            | if self.from_id.is_some() { 1u32 << 8 } else { 0 }).serialize(buf);
        self.id.serialize(buf);
        if let Some(ref v) = self.from_id { v.serialize(buf); }
        self.peer_id.serialize(buf);
        self.date.serialize(buf);
        self.message.serialize(buf);
    }
}

impl Deserializable for Message {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let _flags = u32::deserialize(buf)?;
        let out = (_flags & (1 << 1)) != 0;
        let id = i32::deserialize(buf)?;
        let from_id = if (_flags & (1 << 8)) != 0 { Some(enums::Peer::deserialize(buf)?) } else { None };
        let peer_id = enums::Peer::deserialize(buf)?;
        let date = i32::deserialize(buf)?;
        let message = String::deserialize(buf)?;
        Ok(Self { out, id, from_id, peer_id, date, message })
    }
}

/// [`messageService`](https://core.telegram.org/constructor/messageService) (reduced)
///
/// ```tl
/// messageService#2b085862 flags:# out:flags.1?true id:int from_id:flags.8?Peer peer_id:Peer date:int = Message;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct MessageService {
    pub out: bool,
    pub id: i32,
    pub from_id: Option<enums::Peer>,
    pub peer_id: enums::Peer,
    pub date: i32,
}

impl crate::Identifiable for MessageService {
    const CONSTRUCTOR_ID: u32 = 0x2b085862;
}

impl Serializable for MessageService {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (if self.out { 1u32 << 1 } else { 0 }
            | if self.from_id.is_some() { 1u32 << 8 } else { 0 }).serialize(buf);
        self.id.serialize(buf);
        if let Some(ref v) = self.from_id { v.serialize(buf); }
        self.peer_id.serialize(buf);
        self.date.serialize(buf);
    }
}

impl Deserializable for MessageService {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let _flags = u32::deserialize(buf)?;
        let out = (_flags & (1 << 1)) != 0;
        let id = i32::deserialize(buf)?;
        let from_id = if (_flags & (1 << 8)) != 0 { Some(enums::Peer::deserialize(buf)?) } else { None };
        let peer_id = enums::Peer::deserialize(buf)?;
        let date = i32::deserialize(buf)?;
        Ok(Self { out, id, from_id, peer_id, date })
    }
}

// ─── Update ──────────────────────────────────────────────────────────────────

tl_struct! {
    /// [`updateNewMessage`](https://core.telegram.org/constructor/updateNewMessage)
    pub struct UpdateNewMessage = 0x1f2b0afd {
        pub message: enums::Message,
        pub pts: i32,
        pub pts_count: i32,
    }
}

tl_struct! {
    /// [`updateNewChannelMessage`](https://core.telegram.org/constructor/updateNewChannelMessage)
    pub struct UpdateNewChannelMessage = 0x62ba04d9 {
        pub message: enums::Message,
        pub pts: i32,
        pub pts_count: i32,
    }
}

tl_struct! {
    /// [`updateDeleteMessages`](https://core.telegram.org/constructor/updateDeleteMessages)
    pub struct UpdateDeleteMessages = 0xa20db0e5 {
        pub messages: Vec<i32>,
        pub pts: i32,
        pub pts_count: i32,
    }
}

tl_struct! {
    /// [`updateDeleteChannelMessages`](https://core.telegram.org/constructor/updateDeleteChannelMessages)
    pub struct UpdateDeleteChannelMessages = 0xc32d5b12 {
        pub channel_id: i64,
        pub messages: Vec<i32>,
        pub pts: i32,
        pub pts_count: i32,
    }
}

/// [`updateChannelTooLong`](https://core.telegram.org/constructor/updateChannelTooLong)
///
/// ```tl
/// updateChannelTooLong#108d941f flags:# channel_id:long pts:flags.0?int = Update;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct UpdateChannelTooLong {
    pub channel_id: i64,
    pub pts: Option<i32>,
}

impl crate::Identifiable for UpdateChannelTooLong {
    const CONSTRUCTOR_ID: u32 = 0x108d941f;
}

impl Serializable for UpdateChannelTooLong {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (if self.pts.is_some() { 1u32 << 0 } else { 0 }).serialize(buf);
        self.channel_id.serialize(buf);
        if let Some(ref v) = self.pts { v.serialize(buf); }
    }
}

impl Deserializable for UpdateChannelTooLong {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let _flags = u32::deserialize(buf)?;
        let channel_id = i64::deserialize(buf)?;
        let pts = if (_flags & (1 << 0)) != 0 { Some(i32::deserialize(buf)?) } else { None };
        Ok(Self { channel_id, pts })
    }
}

tl_struct! {
    /// [`updateNewEncryptedMessage`](https://core.telegram.org/constructor/updateNewEncryptedMessage) (reduced)
    ///
    /// The encrypted payload is replaced by its chat id and random id.
    pub struct UpdateNewEncryptedMessage = 0x12bcbd9a {
        pub chat_id: i32,
        pub random_id: i64,
        pub qts: i32,
    }
}

tl_struct! {
    /// [`updateReadChannelInbox`](https://core.telegram.org/constructor/updateReadChannelInbox) (reduced)
    pub struct UpdateReadChannelInbox = 0x922e6e10 {
        pub channel_id: i64,
        pub max_id: i32,
        pub pts: i32,
    }
}

tl_struct! {
    /// [`updateUserStatus`](https://core.telegram.org/constructor/updateUserStatus) (reduced)
    pub struct UpdateUserStatus = 0xe5bdf8de {
        pub user_id: i64,
    }
}

// ─── Updates ─────────────────────────────────────────────────────────────────

tl_struct! {
    /// [`updatesTooLong`](https://core.telegram.org/constructor/updatesTooLong)
    pub struct UpdatesTooLong = 0xe317af7e {}
}

/// [`updateShortMessage`](https://core.telegram.org/constructor/updateShortMessage) (reduced)
///
/// ```tl
/// updateShortMessage#313bc7f8 flags:# out:flags.1?true id:int user_id:long message:string pts:int pts_count:int date:int = Updates;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct UpdateShortMessage {
    pub out: bool,
    pub id: i32,
    pub user_id: i64,
    pub message: String,
    pub pts: i32,
    pub pts_count: i32,
    pub date: i32,
}

impl crate::Identifiable for UpdateShortMessage {
    const CONSTRUCTOR_ID: u32 = 0x313bc7f8;
}

impl Serializable for UpdateShortMessage {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (if self.out { 1u32 << 1 } else { 0 }).serialize(buf);
        self.id.serialize(buf);
        self.user_id.serialize(buf);
        self.message.serialize(buf);
        self.pts.serialize(buf);
        self.pts_count.serialize(buf);
        self.date.serialize(buf);
    }
}

impl Deserializable for UpdateShortMessage {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let _flags = u32::deserialize(buf)?;
        let out = (_flags & (1 << 1)) != 0;
        let id = i32::deserialize(buf)?;
        let user_id = i64::deserialize(buf)?;
        let message = String::deserialize(buf)?;
        let pts = i32::deserialize(buf)?;
        let pts_count = i32::deserialize(buf)?;
        let date = i32::deserialize(buf)?;
        Ok(Self { out, id, user_id, message, pts, pts_count, date })
    }
}

/// [`updateShortChatMessage`](https://core.telegram.org/constructor/updateShortChatMessage) (reduced)
///
/// ```tl
/// updateShortChatMessage#4d6deea5 flags:# out:flags.1?true id:int from_id:long chat_id:long message:string pts:int pts_count:int date:int = Updates;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct UpdateShortChatMessage {
    pub out: bool,
    pub id: i32,
    pub from_id: i64,
    pub chat_id: i64,
    pub message: String,
    pub pts: i32,
    pub pts_count: i32,
    pub date: i32,
}

impl crate::Identifiable for UpdateShortChatMessage {
    const CONSTRUCTOR_ID: u32 = 0x4d6deea5;
}

impl Serializable for UpdateShortChatMessage {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (if self.out { 1u32 << 1 } else { 0 }).serialize(buf);
        self.id.serialize(buf);
        self.from_id.serialize(buf);
        self.chat_id.serialize(buf);
        self.message.serialize(buf);
        self.pts.serialize(buf);
        self.pts_count.serialize(buf);
        self.date.serialize(buf);
    }
}

impl Deserializable for UpdateShortChatMessage {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let _flags = u32::deserialize(buf)?;
        let out = (_flags & (1 << 1)) != 0;
        let id = i32::deserialize(buf)?;
        let from_id = i64::deserialize(buf)?;
        let chat_id = i64::deserialize(buf)?;
        let message = String::deserialize(buf)?;
        let pts = i32::deserialize(buf)?;
        let pts_count = i32::deserialize(buf)?;
        let date = i32::deserialize(buf)?;
        Ok(Self { out, id, from_id, chat_id, message, pts, pts_count, date })
    }
}

tl_struct! {
    /// [`updateShort`](https://core.telegram.org/constructor/updateShort)
    pub struct UpdateShort = 0x78d4dec1 {
        pub update: enums::Update,
        pub date: i32,
    }
}

tl_struct! {
    /// [`updatesCombined`](https://core.telegram.org/constructor/updatesCombined)
    pub struct UpdatesCombined = 0x725b04c3 {
        pub updates: Vec<enums::Update>,
        pub users: Vec<enums::User>,
        pub chats: Vec<enums::Chat>,
        pub date: i32,
        pub seq_start: i32,
        pub seq: i32,
    }
}

tl_struct! {
    /// [`updates`](https://core.telegram.org/constructor/updates)
    pub struct Updates = 0x74ae4240 {
        pub updates: Vec<enums::Update>,
        pub users: Vec<enums::User>,
        pub chats: Vec<enums::Chat>,
        pub date: i32,
        pub seq: i32,
    }
}

// ─── updates.* ───────────────────────────────────────────────────────────────

pub mod updates {
    use crate::deserialize::{Buffer, Result};
    use crate::{Deserializable, Serializable, enums};

    tl_struct! {
        /// [`updates.state`](https://core.telegram.org/constructor/updates.state)
        pub struct State = 0xa56c2a3e {
            pub pts: i32,
            pub qts: i32,
            pub date: i32,
            pub seq: i32,
            pub unread_count: i32,
        }
    }

    tl_struct! {
        /// [`updates.differenceEmpty`](https://core.telegram.org/constructor/updates.differenceEmpty)
        pub struct DifferenceEmpty = 0x5d75a138 {
            pub date: i32,
            pub seq: i32,
        }
    }

    tl_struct! {
        /// [`updates.difference`](https://core.telegram.org/constructor/updates.difference) (reduced)
        ///
        /// Encrypted messages are delivered through `other_updates` only.
        pub struct Difference = 0x00f49ca0 {
            pub new_messages: Vec<enums::Message>,
            pub other_updates: Vec<enums::Update>,
            pub chats: Vec<enums::Chat>,
            pub users: Vec<enums::User>,
            pub state: enums::updates::State,
        }
    }

    tl_struct! {
        /// [`updates.differenceSlice`](https://core.telegram.org/constructor/updates.differenceSlice) (reduced)
        pub struct DifferenceSlice = 0xa8fb1981 {
            pub new_messages: Vec<enums::Message>,
            pub other_updates: Vec<enums::Update>,
            pub chats: Vec<enums::Chat>,
            pub users: Vec<enums::User>,
            pub intermediate_state: enums::updates::State,
        }
    }

    tl_struct! {
        /// [`updates.differenceTooLong`](https://core.telegram.org/constructor/updates.differenceTooLong)
        pub struct DifferenceTooLong = 0x4afe8f6d {
            pub pts: i32,
        }
    }

    /// [`updates.channelDifferenceEmpty`](https://core.telegram.org/constructor/updates.channelDifferenceEmpty)
    ///
    /// ```tl
    /// updates.channelDifferenceEmpty#3e11affb flags:# final:flags.0?true pts:int timeout:flags.1?int = updates.ChannelDifference;
    /// ```
    #[derive(Debug)]
    #[derive(Clone, PartialEq)]
    pub struct ChannelDifferenceEmpty {
        pub r#final: bool,
        pub pts: i32,
        pub timeout: Option<i32>,
    }

    impl crate::Identifiable for ChannelDifferenceEmpty {
        const CONSTRUCTOR_ID: u32 = 0x3e11affb;
    }

    impl Serializable for ChannelDifferenceEmpty {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            (if self.r#final { 1u32 << 0 } else { 0 }
                | if self.timeout.is_some() { 1u32 << 1 } else { 0 }).serialize(buf);
            self.pts.serialize(buf);
            if let Some(ref v) = self.timeout { v.serialize(buf); }
        }
    }

    impl Deserializable for ChannelDifferenceEmpty {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let _flags = u32::deserialize(buf)?;
            let r#final = (_flags & (1 << 0)) != 0;
            let pts = i32::deserialize(buf)?;
            let timeout = if (_flags & (1 << 1)) != 0 { Some(i32::deserialize(buf)?) } else { None };
            Ok(Self { r#final, pts, timeout })
        }
    }

    /// [`updates.channelDifferenceTooLong`](https://core.telegram.org/constructor/updates.channelDifferenceTooLong) (reduced)
    ///
    /// The dialog is replaced by the channel's current `pts`.
    ///
    /// ```tl
    /// updates.channelDifferenceTooLong#a4bcc6fe flags:# final:flags.0?true timeout:flags.1?int pts:int messages:Vector<Message> chats:Vector<Chat> users:Vector<User> = updates.ChannelDifference;
    /// ```
    #[derive(Debug)]
    #[derive(Clone, PartialEq)]
    pub struct ChannelDifferenceTooLong {
        pub r#final: bool,
        pub timeout: Option<i32>,
        pub pts: i32,
        pub messages: Vec<enums::Message>,
        pub chats: Vec<enums::Chat>,
        pub users: Vec<enums::User>,
    }

    impl crate::Identifiable for ChannelDifferenceTooLong {
        const CONSTRUCTOR_ID: u32 = 0xa4bcc6fe;
    }

    impl Serializable for ChannelDifferenceTooLong {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            (if self.r#final { 1u32 << 0 } else { 0 }
                | if self.timeout.is_some() { 1u32 << 1 } else { 0 }).serialize(buf);
            if let Some(ref v) = self.timeout { v.serialize(buf); }
            self.pts.serialize(buf);
            self.messages.serialize(buf);
            self.chats.serialize(buf);
            self.users.serialize(buf);
        }
    }

    impl Deserializable for ChannelDifferenceTooLong {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let _flags = u32::deserialize(buf)?;
            let r#final = (_flags & (1 << 0)) != 0;
            let timeout = if (_flags & (1 << 1)) != 0 { Some(i32::deserialize(buf)?) } else { None };
            let pts = i32::deserialize(buf)?;
            let messages = Vec::<enums::Message>::deserialize(buf)?;
            let chats = Vec::<enums::Chat>::deserialize(buf)?;
            let users = Vec::<enums::User>::deserialize(buf)?;
            Ok(Self { r#final, timeout, pts, messages, chats, users })
        }
    }

    /// [`updates.channelDifference`](https://core.telegram.org/constructor/updates.channelDifference)
    ///
    /// ```tl
    /// updates.channelDifference#2064674e flags:# final:flags.0?true pts:int timeout:flags.1?int new_messages:Vector<Message> other_updates:Vector<Update> chats:Vector<Chat> users:Vector<User> = updates.ChannelDifference;
    /// ```
    #[derive(Debug)]
    #[derive(Clone, PartialEq)]
    pub struct ChannelDifference {
        pub r#final: bool,
        pub pts: i32,
        pub timeout: Option<i32>,
        pub new_messages: Vec<enums::Message>,
        pub other_updates: Vec<enums::Update>,
        pub chats: Vec<enums::Chat>,
        pub users: Vec<enums::User>,
    }

    impl crate::Identifiable for ChannelDifference {
        const CONSTRUCTOR_ID: u32 = 0x2064674e;
    }

    impl Serializable for ChannelDifference {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            (if self.r#final { 1u32 << 0 } else { 0 }
                | if self.timeout.is_some() { 1u32 << 1 } else { 0 }).serialize(buf);
            self.pts.serialize(buf);
            if let Some(ref v) = self.timeout { v.serialize(buf); }
            self.new_messages.serialize(buf);
            self.other_updates.serialize(buf);
            self.chats.serialize(buf);
            self.users.serialize(buf);
        }
    }

    impl Deserializable for ChannelDifference {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let _flags = u32::deserialize(buf)?;
            let r#final = (_flags & (1 << 0)) != 0;
            let pts = i32::deserialize(buf)?;
            let timeout = if (_flags & (1 << 1)) != 0 { Some(i32::deserialize(buf)?) } else { None };
            let new_messages = Vec::<enums::Message>::deserialize(buf)?;
            let other_updates = Vec::<enums::Update>::deserialize(buf)?;
            let chats = Vec::<enums::Chat>::deserialize(buf)?;
            let users = Vec::<enums::User>::deserialize(buf)?;
            Ok(Self { r#final, pts, timeout, new_messages, other_updates, chats, users })
        }
    }
}

// ─── messages.* ──────────────────────────────────────────────────────────────

pub mod messages {
    use crate::enums;

    tl_struct! {
        /// [`messages.chats`](https://core.telegram.org/constructor/messages.chats)
        pub struct Chats = 0x64ff9fd5 {
            pub chats: Vec<enums::Chat>,
        }
    }
}
