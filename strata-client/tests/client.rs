use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use strata_client::entities::PeerKind;
use strata_client::pts::UpdateState;
use strata_client::{
    AuthKey, AutoSleep, Client, Config, ConnectionState, Credentials, InMemoryBackend, InvocationError, NoRetries,
    SessionBackend, Transport, UpdateStream,
};
use strata_crypto::Side;
use strata_mtproto::{EncryptedSession, Message, MsgId};
use strata_tl::{Blob, Deserializable, Identifiable, Serializable, enums, functions, types};
use tokio::sync::mpsc;
use tokio::time::timeout;

const SESSION_ID: i64 = 0x5eed;
const FIRST_SALT: i64 = 0x1234;
const WAIT: Duration = Duration::from_secs(5);

fn key() -> AuthKey {
    let mut data = [0u8; 256];
    data.iter_mut().enumerate().for_each(|(i, b)| *b = (i as u8) ^ 0x5a);
    AuthKey::from_bytes(data)
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

fn boxed<T: Identifiable + Serializable>(value: &T) -> Vec<u8> {
    let mut out = T::CONSTRUCTOR_ID.to_le_bytes().to_vec();
    value.serialize(&mut out);
    out
}

fn ping(id: i64) -> Vec<u8> {
    functions::Ping { ping_id: id }.to_bytes()
}

// ── In-memory transport ───────────────────────────────────────────────────────

enum ToClient {
    Frame(Vec<u8>),
    /// Make the pending `recv` fail as if the peer reset the connection.
    Close,
}

struct ChannelTransport {
    to_server: mpsc::UnboundedSender<Vec<u8>>,
    from_server: mpsc::UnboundedReceiver<ToClient>,
    connects: Arc<AtomicUsize>,
}

impl Transport for ChannelTransport {
    async fn connect(&mut self) -> io::Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) {}

    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.to_server.send(frame.to_vec()).map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        match self.from_server.recv().await {
            Some(ToClient::Frame(frame)) => Ok(frame),
            Some(ToClient::Close) => Err(io::Error::from(io::ErrorKind::ConnectionReset)),
            None => std::future::pending().await,
        }
    }
}

// ── Server end ────────────────────────────────────────────────────────────────

/// The messages of one client frame, with acknowledgements filtered out.
struct Received {
    salt: i64,
    container: Option<MsgId>,
    messages: Vec<Message>,
}

impl Received {
    fn bodies(&self) -> Vec<&[u8]> {
        self.messages.iter().map(|m| m.body.as_slice()).collect()
    }

    fn only(&self) -> &Message {
        assert_eq!(self.messages.len(), 1, "expected a single request");
        &self.messages[0]
    }
}

struct Server {
    session: EncryptedSession,
    next_id: i64,
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
    to_client: mpsc::UnboundedSender<ToClient>,
    connects: Arc<AtomicUsize>,
}

impl Server {
    fn msg_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 4;
        id
    }

    fn send_with_seq(&mut self, seq_no: i32, body: Vec<u8>) {
        let msg_id = MsgId(self.msg_id());
        let frame = self.session.encode_as(&Message { msg_id, seq_no, body }, Side::Server);
        self.to_client.send(ToClient::Frame(frame)).unwrap();
    }

    /// A content-related message.
    fn send(&mut self, body: Vec<u8>) {
        self.send_with_seq(1, body);
    }

    /// A service notification.
    fn notify(&mut self, body: Vec<u8>) {
        self.send_with_seq(0, body);
    }

    fn reply(&mut self, req: MsgId, result: Vec<u8>) {
        self.send(boxed(&types::RpcResult { req_msg_id: req.0, result: Blob(result) }));
    }

    fn pong(&mut self, req: MsgId, ping_id: i64) {
        self.send(boxed(&types::Pong { msg_id: req.0, ping_id }));
    }

    fn close(&self) {
        self.to_client.send(ToClient::Close).unwrap();
    }

    /// Wait for the next client frame carrying anything besides acks.
    async fn requests(&mut self) -> Received {
        loop {
            let mut frame = timeout(WAIT, self.from_client.recv())
                .await
                .expect("timed out waiting for the client")
                .expect("client transport dropped");
            let decrypted = self.session.decode_from(&mut frame, Side::Client).unwrap();
            let message = decrypted.message;

            let (container, messages) =
                if strata_tl::peek_constructor(&message.body) == Some(types::MsgContainer::CONSTRUCTOR_ID) {
                    let members = types::MsgContainer::from_bytes(&message.body[4..]).unwrap().messages.0;
                    (Some(message.msg_id), members.into_iter().map(Message::from).collect())
                } else {
                    (None, vec![message])
                };
            let messages: Vec<Message> = messages
                .into_iter()
                .filter(|m| strata_tl::peek_constructor(&m.body) != Some(types::MsgsAck::CONSTRUCTOR_ID))
                .collect();
            if !messages.is_empty() {
                return Received { salt: decrypted.salt, container, messages };
            }
        }
    }
}

fn test_config(backend: Arc<InMemoryBackend>) -> Config {
    Config {
        retry_policy: Arc::new(NoRetries),
        ping_interval: Duration::from_secs(3600),
        reconnect_delay: Duration::from_millis(10),
        session_backend: backend,
        ..Config::default()
    }
}

async fn start_with(backend: Arc<InMemoryBackend>) -> (Client, UpdateStream, Server) {
    start_configured(test_config(backend)).await
}

async fn start_configured(config: Config) -> (Client, UpdateStream, Server) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let (to_client, from_server) = mpsc::unbounded_channel();
    let connects = Arc::new(AtomicUsize::new(0));
    let transport = ChannelTransport { to_server, from_server, connects: Arc::clone(&connects) };

    let credentials = Credentials {
        session_id: Some(SESSION_ID),
        ..Credentials::new(key(), FIRST_SALT)
    };
    let (client, updates) = Client::connect(transport, credentials, config).await.unwrap();
    let server = Server {
        session: EncryptedSession::with_session_id(key(), 0, 0, SESSION_ID),
        next_id: (now_secs() << 32) | 1,
        from_client,
        to_client,
        connects,
    };
    (client, updates, server)
}

async fn start() -> (Client, UpdateStream, Server) {
    start_with(Arc::new(InMemoryBackend::new())).await
}

fn spawn_ping(client: &Client, ping_id: i64) -> tokio::task::JoinHandle<Result<enums::Pong, InvocationError>> {
    let client = client.clone();
    tokio::spawn(async move { client.invoke(&functions::Ping { ping_id }).await })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invoke_resolves_with_its_result() {
    let (client, _updates, mut server) = start().await;
    let call = spawn_ping(&client, 7);

    let received = server.requests().await;
    assert_eq!(received.salt, FIRST_SALT);
    assert_eq!(received.only().body, ping(7));
    let id = received.only().msg_id;
    server.pong(id, 7);

    let pong = timeout(WAIT, call).await.unwrap().unwrap().unwrap();
    assert_eq!(pong, enums::Pong::Pong(types::Pong { msg_id: id.0, ping_id: 7 }));
}

#[tokio::test]
async fn rejected_message_is_resent_with_a_new_id() {
    let (client, _updates, mut server) = start().await;
    let call = spawn_ping(&client, 1);

    let first = server.requests().await.only().msg_id;
    server.notify(boxed(&types::BadMsgNotification { bad_msg_id: first.0, bad_msg_seqno: 1, error_code: 20 }));

    let resent = server.requests().await;
    let second = resent.only().msg_id;
    assert_eq!(resent.only().body, ping(1));
    assert!(second.0 > first.0);
    server.pong(second, 1);

    assert!(timeout(WAIT, call).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn bad_salt_on_a_container_resends_every_member() {
    let (client, _updates, mut server) = start().await;
    let pings: Vec<_> = (1..=3).map(|ping_id| functions::Ping { ping_id }).collect();
    let handles = client.invoke_batch(&pings);

    let first = server.requests().await;
    let container = first.container.expect("batched requests share a container");
    assert_eq!(first.bodies(), vec![ping(1), ping(2), ping(3)]);

    let new_salt = 0x0bad_5a17;
    server.notify(boxed(&types::BadServerSalt {
        bad_msg_id: container.0,
        bad_msg_seqno: 0,
        error_code: 48,
        new_server_salt: new_salt,
    }));

    let resent = server.requests().await;
    assert_eq!(resent.salt, new_salt);
    assert!(resent.container.is_some());
    assert_eq!(resent.bodies(), vec![ping(1), ping(2), ping(3)]);
    for (old, new) in first.messages.iter().zip(&resent.messages) {
        assert_ne!(old.msg_id, new.msg_id);
    }

    let ids: Vec<MsgId> = resent.messages.iter().map(|m| m.msg_id).collect();
    for (ping_id, id) in (1..=3).zip(ids) {
        server.pong(id, ping_id);
    }
    for (ping_id, handle) in (1..=3).zip(handles) {
        let pong = timeout(WAIT, handle.wait()).await.unwrap().unwrap();
        let enums::Pong::Pong(pong) = pong;
        assert_eq!(pong.ping_id, ping_id);
    }
}

#[tokio::test]
async fn unknown_auth_key_fails_everything() {
    let (client, _updates, mut server) = start().await;
    let call = spawn_ping(&client, 1);
    server.requests().await;

    server.to_client.send(ToClient::Frame((-404i32).to_le_bytes().to_vec())).unwrap();

    let err = timeout(WAIT, call).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, InvocationError::Transport { code: -404 }), "{err:?}");

    let mut state = client.connection_state();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected)).await.unwrap().unwrap();

    let later = client.invoke(&functions::Ping { ping_id: 2 }).await;
    assert!(matches!(later, Err(InvocationError::Dropped)));
}

#[tokio::test]
async fn lost_connection_is_reestablished_and_requests_resent() {
    let (client, _updates, mut server) = start().await;
    let call = spawn_ping(&client, 5);

    let first = server.requests().await.only().msg_id;
    server.close();

    let resent = server.requests().await;
    assert_eq!(resent.only().body, ping(5));
    assert_ne!(resent.only().msg_id, first);
    assert_eq!(server.connects.load(Ordering::SeqCst), 2);
    server.pong(resent.only().msg_id, 5);

    assert!(timeout(WAIT, call).await.unwrap().unwrap().is_ok());
    assert_eq!(*client.connection_state().borrow(), ConnectionState::Connected);
}

#[tokio::test]
async fn pushed_updates_reach_the_stream() {
    let (_client, mut updates, mut server) = start().await;

    let push = enums::Updates::UpdateShort(types::UpdateShort {
        update: enums::Update::UserStatus(types::UpdateUserStatus { user_id: 99 }),
        date: 1_700_000_000,
    });
    server.send(push.to_bytes());

    let item = timeout(WAIT, updates.next()).await.unwrap().unwrap();
    assert_eq!(
        item.update(),
        Some(&enums::Update::UserStatus(types::UpdateUserStatus { user_id: 99 }))
    );
}

#[tokio::test]
async fn synced_state_is_saved_with_the_session() {
    let backend = Arc::new(InMemoryBackend::new());
    let (client, _updates, mut server) = start_with(Arc::clone(&backend)).await;

    let sync = {
        let client = client.clone();
        tokio::spawn(async move { client.sync_update_state().await })
    };
    let request = server.requests().await;
    assert_eq!(request.only().body, functions::updates::GetState {}.to_bytes());
    let state = types::updates::State { pts: 100, qts: 0, date: 1_700_000_000, seq: 3, unread_count: 0 };
    server.reply(request.only().msg_id, enums::updates::State::State(state.clone()).to_bytes());
    assert_eq!(timeout(WAIT, sync).await.unwrap().unwrap().unwrap(), state);

    client.save_session().await.unwrap();
    let saved = backend.load().unwrap().expect("session was saved");
    assert_eq!(saved.auth_key, key().to_bytes());
    assert_eq!(saved.salt, FIRST_SALT);
    assert_eq!(
        saved.update_state,
        Some(UpdateState { pts: 100, date: 1_700_000_000, seq: 3, ..UpdateState::default() })
    );
}

#[tokio::test]
async fn flood_wait_on_a_batch_member_is_retried() {
    let config = Config {
        retry_policy: Arc::new(AutoSleep {
            threshold: Duration::from_secs(5),
            max_retries: 2,
            io_errors_as_flood_of: None,
        }),
        ..test_config(Arc::new(InMemoryBackend::new()))
    };
    let (client, _updates, mut server) = start_configured(config).await;
    let pings: Vec<_> = (1..=2).map(|ping_id| functions::Ping { ping_id }).collect();
    let handles = client.invoke_batch(&pings);

    let first = server.requests().await;
    assert_eq!(first.bodies(), vec![ping(1), ping(2)]);
    server.pong(first.messages[0].msg_id, 1);
    let flood = boxed(&types::RpcError { error_code: 420, error_message: "FLOOD_WAIT_0".into() });
    server.reply(first.messages[1].msg_id, flood);

    let mut handles = handles.into_iter();
    let (one, two) = (handles.next().unwrap(), handles.next().unwrap());
    let two = tokio::spawn(two.wait());
    let enums::Pong::Pong(pong) = timeout(WAIT, one.wait()).await.unwrap().unwrap();
    assert_eq!(pong.ping_id, 1);

    let retried = server.requests().await;
    assert_eq!(retried.only().body, ping(2));
    assert_ne!(retried.only().msg_id, first.messages[1].msg_id);
    server.pong(retried.only().msg_id, 2);

    let enums::Pong::Pong(pong) = timeout(WAIT, two).await.unwrap().unwrap().unwrap();
    assert_eq!(pong.ping_id, 2);
}

#[tokio::test]
async fn invoke_results_feed_the_entity_cache() {
    let (client, _updates, mut server) = start().await;
    assert_eq!(client.entities().access_hash(PeerKind::Channel, 31), None);

    let call = {
        let client = client.clone();
        tokio::spawn(async move {
            let id = vec![enums::InputChannel::Channel(types::InputChannel { channel_id: 31, access_hash: 0 })];
            client.invoke(&functions::channels::GetChannels { id }).await
        })
    };
    let request = server.requests().await;
    let chats = enums::messages::Chats::Chats(types::messages::Chats {
        chats: vec![enums::Chat::Channel(types::Channel {
            min: false,
            id: 31,
            access_hash: Some(3131),
            title: "news".into(),
        })],
    });
    server.reply(request.only().msg_id, chats.to_bytes());
    timeout(WAIT, call).await.unwrap().unwrap().unwrap();

    assert_eq!(client.entities().access_hash(PeerKind::Channel, 31), Some(3131));
}
