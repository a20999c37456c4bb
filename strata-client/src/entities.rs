//! Access-hash cache.
//!
//! Update batches, differences and many responses carry the users and chats
//! they mention.  Every one the client decodes is scanned, and the access
//! hashes are recorded here so later requests (most importantly
//! `updates.getChannelDifference`) can name them.
//!
//! "Min" entities arrive without a usable hash.  When a message mentions one,
//! the cache remembers the message as a [`MinRef`] so the full entity can be
//! fetched with an `input*FromMessage` reference.

use std::collections::HashMap;
use std::sync::Mutex;

use strata_tl::{Deserializable, Identifiable, enums, types};

/// Kind of peer an id belongs to.  Ids are only unique within a kind.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum PeerKind {
    User,
    Chat,
    Channel,
}

/// A message in which a min entity was seen.
#[derive(Clone, Debug, PartialEq)]
pub struct MinRef {
    /// The chat the message lives in.
    pub peer: enums::InputPeer,
    /// The message id.
    pub msg_id: i32,
}

/// What the cache knows about a peer.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// Usable access hash (`0` for basic groups, which need none).
    Resolved(i64),
    /// Only seen as a min entity; a lookup through the message is pending.
    Pending(MinRef),
}

/// A lookup the sequencer should run in the background.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    User(enums::InputUser),
    Channel(enums::InputChannel),
}

/// Shared access-hash cache.
#[derive(Debug, Default)]
pub struct EntityCache {
    map: Mutex<HashMap<(PeerKind, i64), Resolution>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(PeerKind, i64), Resolution>> {
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a usable access hash.
    pub fn insert(&self, kind: PeerKind, id: i64, access_hash: i64) {
        self.lock().insert((kind, id), Resolution::Resolved(access_hash));
    }

    /// Scan users and chats for access hashes.
    pub fn extend(&self, users: &[enums::User], chats: &[enums::Chat]) {
        let mut map = self.lock();
        for user in users {
            if let enums::User::User(types::User { min: false, id, access_hash: Some(hash), .. }) = user {
                map.insert((PeerKind::User, *id), Resolution::Resolved(*hash));
            }
        }
        for chat in chats {
            let (key, hash) = match chat {
                enums::Chat::Chat(c) => ((PeerKind::Chat, c.id), 0),
                enums::Chat::Channel(types::Channel { min: false, id, access_hash: Some(hash), .. }) => {
                    ((PeerKind::Channel, *id), *hash)
                }
                enums::Chat::ChannelForbidden(c) => ((PeerKind::Channel, c.id), c.access_hash),
                _ => continue,
            };
            map.insert(key, Resolution::Resolved(hash));
        }
    }

    /// Scan a serialized response for users and chats.
    ///
    /// Understands `messages.chats`, `Vector<User>` and the `Updates`
    /// constructors that carry entity lists; other responses are ignored.
    pub fn note_response(&self, body: &[u8]) {
        let Some(id) = strata_tl::peek_constructor(body) else { return };
        match id {
            types::messages::Chats::CONSTRUCTOR_ID => {
                if let Ok(enums::messages::Chats::Chats(c)) = enums::messages::Chats::from_bytes(body) {
                    self.extend(&[], &c.chats);
                }
            }
            types::Updates::CONSTRUCTOR_ID | types::UpdatesCombined::CONSTRUCTOR_ID => {
                match enums::Updates::from_bytes(body) {
                    Ok(enums::Updates::Updates(u)) => self.extend(&u.users, &u.chats),
                    Ok(enums::Updates::Combined(u)) => self.extend(&u.users, &u.chats),
                    _ => {}
                }
            }
            strata_tl::VECTOR_ID => {
                let first = body.get(8..).and_then(strata_tl::peek_constructor);
                let holds_users = matches!(first, Some(types::User::CONSTRUCTOR_ID | types::UserEmpty::CONSTRUCTOR_ID));
                if holds_users {
                    if let Ok(users) = Vec::<enums::User>::from_bytes(body) {
                        self.extend(&users, &[]);
                    }
                }
            }
            _ => {}
        }
    }

    /// What is known about a peer.
    pub fn resolution(&self, kind: PeerKind, id: i64) -> Option<Resolution> {
        self.lock().get(&(kind, id)).cloned()
    }

    /// The usable access hash of a peer.
    pub fn access_hash(&self, kind: PeerKind, id: i64) -> Option<i64> {
        match self.resolution(kind, id)? {
            Resolution::Resolved(hash) => Some(hash),
            Resolution::Pending(_) => None,
        }
    }

    /// Number of peers with a usable hash.
    pub fn resolved_len(&self) -> usize {
        self.lock().values().filter(|r| matches!(r, Resolution::Resolved(_))).count()
    }

    /// Build an `InputPeer` for a peer whose hash is known.
    pub fn input_peer(&self, peer: &enums::Peer) -> Option<enums::InputPeer> {
        Some(match peer {
            enums::Peer::User(u) => enums::InputPeer::User(types::InputPeerUser {
                user_id: u.user_id,
                access_hash: self.access_hash(PeerKind::User, u.user_id)?,
            }),
            enums::Peer::Chat(c) => enums::InputPeer::Chat(types::InputPeerChat { chat_id: c.chat_id }),
            enums::Peer::Channel(c) => enums::InputPeer::Channel(types::InputPeerChannel {
                channel_id: c.channel_id,
                access_hash: self.access_hash(PeerKind::Channel, c.channel_id)?,
            }),
        })
    }

    /// Build an `InputChannel` for a channel whose hash is known.
    pub fn input_channel(&self, channel_id: i64) -> Option<enums::InputChannel> {
        let access_hash = self.access_hash(PeerKind::Channel, channel_id)?;
        Some(enums::InputChannel::Channel(types::InputChannel { channel_id, access_hash }))
    }

    /// Check the sender of `message` and return a lookup if it is unknown.
    ///
    /// The sender is marked [`Resolution::Pending`] so the same entity is
    /// not requested twice.  Returns `None` when the sender is already
    /// known, already pending, or when the chat itself cannot be named.
    pub fn note_message(&self, message: &enums::Message) -> Option<Lookup> {
        let from = message.from_id()?;
        let (kind, id) = match from {
            enums::Peer::User(u) => (PeerKind::User, u.user_id),
            enums::Peer::Channel(c) => (PeerKind::Channel, c.channel_id),
            enums::Peer::Chat(_) => return None,
        };
        if self.resolution(kind, id).is_some() {
            return None;
        }
        let peer = self.input_peer(message.peer_id()?)?;
        let msg_id = message.id();
        self.lock().insert((kind, id), Resolution::Pending(MinRef { peer: peer.clone(), msg_id }));

        Some(match kind {
            PeerKind::User => Lookup::User(enums::InputUser::FromMessage(types::InputUserFromMessage {
                peer,
                msg_id,
                user_id: id,
            })),
            _ => Lookup::Channel(enums::InputChannel::FromMessage(types::InputChannelFromMessage {
                peer,
                msg_id,
                channel_id: id,
            })),
        })
    }

    /// Forget a pending entry whose lookup failed, so a later mention retries it.
    pub fn forget_pending(&self, kind: PeerKind, id: i64) {
        let mut map = self.lock();
        if matches!(map.get(&(kind, id)), Some(Resolution::Pending(_))) {
            map.remove(&(kind, id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, min: bool, hash: Option<i64>) -> enums::User {
        enums::User::User(types::User { min, id, access_hash: hash, first_name: None })
    }

    fn message(from: i64, chat: i64) -> enums::Message {
        enums::Message::Message(types::Message {
            out: false,
            id: 77,
            from_id: Some(enums::Peer::User(types::PeerUser { user_id: from })),
            peer_id: enums::Peer::Chat(types::PeerChat { chat_id: chat }),
            date: 0,
            message: String::new(),
        })
    }

    #[test]
    fn min_users_do_not_overwrite() {
        let cache = EntityCache::new();
        cache.extend(&[user(1, false, Some(11)), user(2, true, Some(22))], &[]);
        assert_eq!(cache.access_hash(PeerKind::User, 1), Some(11));
        assert_eq!(cache.access_hash(PeerKind::User, 2), None);
        cache.extend(&[user(1, true, Some(99))], &[]);
        assert_eq!(cache.access_hash(PeerKind::User, 1), Some(11));
    }

    #[test]
    fn unknown_sender_yields_one_lookup() {
        let cache = EntityCache::new();
        let msg = message(5, 3);
        let lookup = cache.note_message(&msg).unwrap();
        assert_eq!(
            lookup,
            Lookup::User(enums::InputUser::FromMessage(types::InputUserFromMessage {
                peer: enums::InputPeer::Chat(types::InputPeerChat { chat_id: 3 }),
                msg_id: 77,
                user_id: 5,
            }))
        );
        assert!(matches!(cache.resolution(PeerKind::User, 5), Some(Resolution::Pending(_))));
        assert!(cache.note_message(&msg).is_none());

        cache.extend(&[user(5, false, Some(55))], &[]);
        assert_eq!(cache.access_hash(PeerKind::User, 5), Some(55));
    }

    #[test]
    fn channels_and_chats() {
        let cache = EntityCache::new();
        cache.extend(
            &[],
            &[
                enums::Chat::Chat(types::Chat { id: 1, title: "g".into() }),
                enums::Chat::Channel(types::Channel { min: false, id: 2, access_hash: Some(20), title: "c".into() }),
            ],
        );
        assert_eq!(cache.access_hash(PeerKind::Chat, 1), Some(0));
        assert_eq!(
            cache.input_channel(2),
            Some(enums::InputChannel::Channel(types::InputChannel { channel_id: 2, access_hash: 20 }))
        );
        assert_eq!(cache.input_channel(3), None);
    }

    #[test]
    fn responses_are_scanned_for_entities() {
        use strata_tl::Serializable;

        let cache = EntityCache::new();
        cache.note_response(&vec![user(4, false, Some(44)), user(5, true, Some(55))].to_bytes());
        assert_eq!(cache.access_hash(PeerKind::User, 4), Some(44));
        assert_eq!(cache.access_hash(PeerKind::User, 5), None);

        let chats = enums::messages::Chats::Chats(types::messages::Chats {
            chats: vec![enums::Chat::Channel(types::Channel { min: false, id: 6, access_hash: Some(66), title: "c".into() })],
        });
        cache.note_response(&chats.to_bytes());
        assert_eq!(cache.access_hash(PeerKind::Channel, 6), Some(66));

        let updates = enums::Updates::Updates(types::Updates {
            updates: Vec::new(),
            users: vec![user(7, false, Some(77))],
            chats: Vec::new(),
            date: 0,
            seq: 0,
        });
        cache.note_response(&updates.to_bytes());
        assert_eq!(cache.access_hash(PeerKind::User, 7), Some(77));

        // Vectors of anything else are left alone.
        cache.note_response(&vec![1i64, 2, 3].to_bytes());
        cache.note_response(&[]);
        assert_eq!(cache.resolved_len(), 3);
    }
}
