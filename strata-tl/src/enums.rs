//! Boxed types.
//!
//! Each enum serializes its variant's constructor ID followed by the bare
//! constructor, and deserializes by dispatching on that ID.

use crate::deserialize::{Buffer, Error, Result};
use crate::{Deserializable, Identifiable, Serializable, types};

// ─── Service ─────────────────────────────────────────────────────────────────

tl_enum! {
    /// [`Pong`](https://core.telegram.org/type/Pong)
    pub enum Pong {
        Pong(types::Pong),
    }
}

tl_enum! {
    /// [`MsgsAck`](https://core.telegram.org/mtproto/service_messages_about_messages)
    pub enum MsgsAck {
        MsgsAck(types::MsgsAck),
    }
}

tl_enum! {
    /// [`MsgsStateInfo`](https://core.telegram.org/mtproto/service_messages_about_messages)
    pub enum MsgsStateInfo {
        MsgsStateInfo(types::MsgsStateInfo),
    }
}

tl_enum! {
    /// [`MsgsStateReq`](https://core.telegram.org/mtproto/service_messages_about_messages)
    pub enum MsgsStateReq {
        MsgsStateReq(types::MsgsStateReq),
    }
}

tl_enum! {
    /// [`RpcError`](https://core.telegram.org/mtproto/service_messages)
    pub enum RpcError {
        RpcError(types::RpcError),
    }
}

tl_enum! {
    /// [`MsgDetailedInfo`](https://core.telegram.org/mtproto/service_messages_about_messages)
    pub enum MsgDetailedInfo {
        MsgDetailedInfo(types::MsgDetailedInfo),
        MsgNewDetailedInfo(types::MsgNewDetailedInfo),
    }
}

tl_enum! {
    /// [`BadMsgNotification`](https://core.telegram.org/mtproto/service_messages_about_messages)
    pub enum BadMsgNotification {
        BadMsgNotification(types::BadMsgNotification),
        BadServerSalt(types::BadServerSalt),
    }
}

// ─── Peers ───────────────────────────────────────────────────────────────────

tl_enum! {
    /// [`Peer`](https://core.telegram.org/type/Peer)
    pub enum Peer {
        User(types::PeerUser),
        Chat(types::PeerChat),
        Channel(types::PeerChannel),
    }
}

/// [`InputPeer`](https://core.telegram.org/type/InputPeer)
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub enum InputPeer {
    Empty,
    PeerSelf,
    Chat(types::InputPeerChat),
    User(types::InputPeerUser),
    Channel(types::InputPeerChannel),
}

impl Serializable for InputPeer {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        match self {
            Self::Empty => types::InputPeerEmpty::CONSTRUCTOR_ID.serialize(buf),
            Self::PeerSelf => types::InputPeerSelf::CONSTRUCTOR_ID.serialize(buf),
            Self::Chat(x) => {
                types::InputPeerChat::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
            Self::User(x) => {
                types::InputPeerUser::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
            Self::Channel(x) => {
                types::InputPeerChannel::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
        }
    }
}

impl Deserializable for InputPeer {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let id = u32::deserialize(buf)?;
        Ok(match id {
            types::InputPeerEmpty::CONSTRUCTOR_ID => Self::Empty,
            types::InputPeerSelf::CONSTRUCTOR_ID => Self::PeerSelf,
            types::InputPeerChat::CONSTRUCTOR_ID => Self::Chat(types::InputPeerChat::deserialize(buf)?),
            types::InputPeerUser::CONSTRUCTOR_ID => Self::User(types::InputPeerUser::deserialize(buf)?),
            types::InputPeerChannel::CONSTRUCTOR_ID => Self::Channel(types::InputPeerChannel::deserialize(buf)?),
            _ => return Err(Error::UnexpectedConstructor { id }),
        })
    }
}

/// [`InputUser`](https://core.telegram.org/type/InputUser)
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub enum InputUser {
    Empty,
    UserSelf,
    User(types::InputUser),
    FromMessage(types::InputUserFromMessage),
}

impl Serializable for InputUser {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        match self {
            Self::Empty => types::InputUserEmpty::CONSTRUCTOR_ID.serialize(buf),
            Self::UserSelf => types::InputUserSelf::CONSTRUCTOR_ID.serialize(buf),
            Self::User(x) => {
                types::InputUser::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
            Self::FromMessage(x) => {
                types::InputUserFromMessage::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
        }
    }
}

impl Deserializable for InputUser {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let id = u32::deserialize(buf)?;
        Ok(match id {
            types::InputUserEmpty::CONSTRUCTOR_ID => Self::Empty,
            types::InputUserSelf::CONSTRUCTOR_ID => Self::UserSelf,
            types::InputUser::CONSTRUCTOR_ID => Self::User(types::InputUser::deserialize(buf)?),
            types::InputUserFromMessage::CONSTRUCTOR_ID => {
                Self::FromMessage(types::InputUserFromMessage::deserialize(buf)?)
            }
            _ => return Err(Error::UnexpectedConstructor { id }),
        })
    }
}

/// [`InputChannel`](https://core.telegram.org/type/InputChannel)
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub enum InputChannel {
    Empty,
    Channel(types::InputChannel),
    FromMessage(types::InputChannelFromMessage),
}

impl Serializable for InputChannel {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        match self {
            Self::Empty => types::InputChannelEmpty::CONSTRUCTOR_ID.serialize(buf),
            Self::Channel(x) => {
                types::InputChannel::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
            Self::FromMessage(x) => {
                types::InputChannelFromMessage::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
        }
    }
}

impl Deserializable for InputChannel {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let id = u32::deserialize(buf)?;
        Ok(match id {
            types::InputChannelEmpty::CONSTRUCTOR_ID => Self::Empty,
            types::InputChannel::CONSTRUCTOR_ID => Self::Channel(types::InputChannel::deserialize(buf)?),
            types::InputChannelFromMessage::CONSTRUCTOR_ID => {
                Self::FromMessage(types::InputChannelFromMessage::deserialize(buf)?)
            }
            _ => return Err(Error::UnexpectedConstructor { id }),
        })
    }
}

/// [`ChannelMessagesFilter`](https://core.telegram.org/type/ChannelMessagesFilter)
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub enum ChannelMessagesFilter {
    Empty,
}

impl Serializable for ChannelMessagesFilter {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        match self {
            Self::Empty => types::ChannelMessagesFilterEmpty::CONSTRUCTOR_ID.serialize(buf),
        }
    }
}

impl Deserializable for ChannelMessagesFilter {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let id = u32::deserialize(buf)?;
        match id {
            types::ChannelMessagesFilterEmpty::CONSTRUCTOR_ID => Ok(Self::Empty),
            _ => Err(Error::UnexpectedConstructor { id }),
        }
    }
}

// ─── Users, chats, messages ──────────────────────────────────────────────────

tl_enum! {
    /// [`User`](https://core.telegram.org/type/User)
    pub enum User {
        Empty(types::UserEmpty),
        User(types::User),
    }
}

tl_enum! {
    /// [`Chat`](https://core.telegram.org/type/Chat)
    pub enum Chat {
        Empty(types::ChatEmpty),
        Chat(types::Chat),
        Channel(types::Channel),
        ChannelForbidden(types::ChannelForbidden),
    }
}

tl_enum! {
    /// [`Message`](https://core.telegram.org/type/Message)
    pub enum Message {
        Empty(types::MessageEmpty),
        Message(types::Message),
        Service(types::MessageService),
    }
}

impl Message {
    /// The message id, regardless of variant.
    pub fn id(&self) -> i32 {
        match self {
            Self::Empty(m) => m.id,
            Self::Message(m) => m.id,
            Self::Service(m) => m.id,
        }
    }

    /// The chat the message belongs to, if known.
    pub fn peer_id(&self) -> Option<&Peer> {
        match self {
            Self::Empty(m) => m.peer_id.as_ref(),
            Self::Message(m) => Some(&m.peer_id),
            Self::Service(m) => Some(&m.peer_id),
        }
    }

    /// The sender, if the message carries one.
    pub fn from_id(&self) -> Option<&Peer> {
        match self {
            Self::Empty(_) => None,
            Self::Message(m) => m.from_id.as_ref(),
            Self::Service(m) => m.from_id.as_ref(),
        }
    }
}

// ─── Updates ─────────────────────────────────────────────────────────────────

tl_enum! {
    /// [`Update`](https://core.telegram.org/type/Update)
    pub enum Update {
        NewMessage(types::UpdateNewMessage),
        NewChannelMessage(types::UpdateNewChannelMessage),
        DeleteMessages(types::UpdateDeleteMessages),
        DeleteChannelMessages(types::UpdateDeleteChannelMessages),
        ChannelTooLong(types::UpdateChannelTooLong),
        NewEncryptedMessage(types::UpdateNewEncryptedMessage),
        ReadChannelInbox(types::UpdateReadChannelInbox),
        UserStatus(types::UpdateUserStatus),
    }
}

/// [`Updates`](https://core.telegram.org/type/Updates)
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub enum Updates {
    TooLong,
    UpdateShortMessage(types::UpdateShortMessage),
    UpdateShortChatMessage(types::UpdateShortChatMessage),
    UpdateShort(types::UpdateShort),
    Combined(types::UpdatesCombined),
    Updates(types::Updates),
}

impl Serializable for Updates {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        match self {
            Self::TooLong => types::UpdatesTooLong::CONSTRUCTOR_ID.serialize(buf),
            Self::UpdateShortMessage(x) => {
                types::UpdateShortMessage::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
            Self::UpdateShortChatMessage(x) => {
                types::UpdateShortChatMessage::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
            Self::UpdateShort(x) => {
                types::UpdateShort::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
            Self::Combined(x) => {
                types::UpdatesCombined::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
            Self::Updates(x) => {
                types::Updates::CONSTRUCTOR_ID.serialize(buf);
                x.serialize(buf);
            }
        }
    }
}

impl Deserializable for Updates {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let id = u32::deserialize(buf)?;
        Ok(match id {
            types::UpdatesTooLong::CONSTRUCTOR_ID => Self::TooLong,
            types::UpdateShortMessage::CONSTRUCTOR_ID => {
                Self::UpdateShortMessage(types::UpdateShortMessage::deserialize(buf)?)
            }
            types::UpdateShortChatMessage::CONSTRUCTOR_ID => {
                Self::UpdateShortChatMessage(types::UpdateShortChatMessage::deserialize(buf)?)
            }
            types::UpdateShort::CONSTRUCTOR_ID => Self::UpdateShort(types::UpdateShort::deserialize(buf)?),
            types::UpdatesCombined::CONSTRUCTOR_ID => Self::Combined(types::UpdatesCombined::deserialize(buf)?),
            types::Updates::CONSTRUCTOR_ID => Self::Updates(types::Updates::deserialize(buf)?),
            _ => return Err(Error::UnexpectedConstructor { id }),
        })
    }
}

impl From<types::UpdateShortMessage> for Updates {
    fn from(x: types::UpdateShortMessage) -> Self { Self::UpdateShortMessage(x) }
}

impl From<types::UpdateShortChatMessage> for Updates {
    fn from(x: types::UpdateShortChatMessage) -> Self { Self::UpdateShortChatMessage(x) }
}

impl From<types::UpdateShort> for Updates {
    fn from(x: types::UpdateShort) -> Self { Self::UpdateShort(x) }
}

impl From<types::UpdatesCombined> for Updates {
    fn from(x: types::UpdatesCombined) -> Self { Self::Combined(x) }
}

impl From<types::Updates> for Updates {
    fn from(x: types::Updates) -> Self { Self::Updates(x) }
}

// ─── updates.* ───────────────────────────────────────────────────────────────

pub mod updates {
    use crate::types;

    tl_enum! {
        /// [`updates.State`](https://core.telegram.org/type/updates.State)
        pub enum State {
            State(types::updates::State),
        }
    }

    tl_enum! {
        /// [`updates.Difference`](https://core.telegram.org/type/updates.Difference)
        pub enum Difference {
            Empty(types::updates::DifferenceEmpty),
            Difference(types::updates::Difference),
            Slice(types::updates::DifferenceSlice),
            TooLong(types::updates::DifferenceTooLong),
        }
    }

    tl_enum! {
        /// [`updates.ChannelDifference`](https://core.telegram.org/type/updates.ChannelDifference)
        pub enum ChannelDifference {
            Empty(types::updates::ChannelDifferenceEmpty),
            TooLong(types::updates::ChannelDifferenceTooLong),
            Difference(types::updates::ChannelDifference),
        }
    }
}

// ─── messages.* ──────────────────────────────────────────────────────────────

pub mod messages {
    use crate::types;

    tl_enum! {
        /// [`messages.Chats`](https://core.telegram.org/type/messages.Chats)
        pub enum Chats {
            Chats(types::messages::Chats),
        }
    }
}
