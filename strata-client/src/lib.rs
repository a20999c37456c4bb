//! # strata-client
//!
//! Async MTProto client engine built on `strata-mtproto`.
//!
//! ## Features
//! - One sender task per connection: requests are pipelined, batched into
//!   containers and matched to their results by message id
//! - Automatic resend on `bad_server_salt`, clock skew and other recoverable
//!   notifications; reconnect with in-flight requests preserved
//! - `FLOOD_WAIT` auto-retry with configurable policy
//! - Ordered update stream with gap detection, bounded waits and
//!   `getDifference` / `getChannelDifference` recovery
//! - Access-hash cache fed from every update batch
//! - Session persistence through pluggable backends
//!
//! ## Example
//!
//! ```rust,no_run
//! use strata_client::{AuthKey, Client, Config, Credentials};
//!
//! # async fn run(auth_key: AuthKey, salt: i64) -> Result<(), strata_client::InvocationError> {
//! let (client, mut updates) =
//!     Client::connect_tcp("149.154.167.51:443", Credentials::new(auth_key, salt), Config::default()).await?;
//! client.sync_update_state().await?;
//!
//! while let Some(item) = updates.next().await {
//!     if let strata_client::UpdateOrSkipped::Update { update, commit } = item {
//!         println!("{update:?}");
//!         commit.commit();
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod errors;
mod retry;
mod session;
pub mod entities;
pub mod pts;
pub mod sender;
pub mod sequencer;
pub mod session_backend;
pub mod transport;

pub use errors::{InvocationError, RpcError};
pub use retry::{AutoSleep, NoRetries, RetryContext, RetryPolicy};
pub use sender::{ConnectionState, SenderHandle};
pub use sequencer::{Commit, Sequencer, SequencerConfig, UpdateOrSkipped, UpdateStream, UpdatesSource};
pub use session::{Credentials, PersistedSession};
pub use session_backend::{BinaryFileBackend, InMemoryBackend, SessionBackend};
pub use strata_crypto::AuthKey;
pub use strata_mtproto::MtpConfig;
pub use transport::{TcpTransport, Transport, TransportKind};

use std::io;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use entities::EntityCache;
use pts::UpdateState;
use sender::{Inbound, SenderOptions};
use strata_mtproto::{EncryptedSession, Mtp};
use strata_tl::{Deserializable, RemoteCall, Serializable, enums, types};
use tokio::sync::{mpsc, oneshot, watch};

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`Client::connect`].
pub struct Config {
    /// Which MTProto transport framing [`Client::connect_tcp`] uses (default: Abridged).
    pub transport:          TransportKind,
    pub retry_policy:       Arc<dyn RetryPolicy>,
    /// Container ceilings.
    pub mtp:                MtpConfig,
    pub sequencer:          SequencerConfig,
    /// Interval between `ping_delay_disconnect` keepalives (default: 60 s).
    pub ping_interval:      Duration,
    /// Reconnect attempts before pending requests fail (default: 5).
    pub reconnect_attempts: u32,
    /// Base delay between reconnect attempts; attempt `n` waits `n` times this.
    pub reconnect_delay:    Duration,
    /// Session persistence backend (default: binary file `"strata.session"`).
    pub session_backend:    Arc<dyn SessionBackend>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport:          TransportKind::Abridged,
            retry_policy:       Arc::new(AutoSleep::default()),
            mtp:                MtpConfig::default(),
            sequencer:          SequencerConfig::default(),
            ping_interval:      Duration::from_secs(60),
            reconnect_attempts: 5,
            reconnect_delay:    Duration::from_secs(1),
            session_backend:    Arc::new(BinaryFileBackend::new("strata.session")),
        }
    }
}

// ─── ResponseHandle ───────────────────────────────────────────────────────────

/// The future result of one request sent through [`Client::invoke_batch`].
pub struct ResponseHandle<R: RemoteCall> {
    rx:       oneshot::Receiver<Result<Vec<u8>, InvocationError>>,
    body:     Vec<u8>,
    client:   Client,
    _request: PhantomData<fn() -> R>,
}

impl<R: RemoteCall> ResponseHandle<R> {
    /// Wait for the response.
    ///
    /// A failure goes through the client's retry policy; retries of this
    /// request are sent on their own, outside the original container.
    pub async fn wait(self) -> Result<R::Return, InvocationError> {
        let first = self.rx.await.unwrap_or(Err(InvocationError::Dropped));
        let body = self.client.inner.sender.retry(&self.body, first).await?;
        self.client.decode_response::<R>(&body)
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

struct ClientInner {
    sender:          SenderHandle,
    sequencer:       Sequencer<SenderHandle>,
    state:           watch::Receiver<ConnectionState>,
    session_backend: Arc<dyn SessionBackend>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.sender.disconnect();
    }
}

/// A connected session.  Cheap to clone; the connection closes when the last
/// clone is dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Connect over `transport` and start the sender task and update pump.
    pub async fn connect<T: Transport>(
        transport: T,
        credentials: Credentials,
        config: Config,
    ) -> Result<(Self, UpdateStream), InvocationError> {
        let session = match credentials.session_id {
            Some(id) => EncryptedSession::with_session_id(
                credentials.auth_key,
                credentials.first_salt,
                credentials.time_offset,
                id,
            ),
            None => EncryptedSession::new(credentials.auth_key, credentials.first_salt, credentials.time_offset),
        };
        let options = SenderOptions {
            ping_interval:      config.ping_interval,
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay:    config.reconnect_delay,
        };
        let (sender, inbound, state) =
            sender::spawn(transport, Mtp::new(session, config.mtp), options, config.retry_policy).await?;

        let (sequencer, updates) = Sequencer::new(
            sender.clone(),
            Arc::new(EntityCache::new()),
            credentials.update_state.unwrap_or_default(),
            config.sequencer.clone(),
        );
        tokio::spawn(update_pump(sequencer.clone(), inbound, config.sequencer.no_updates_timeout));
        tracing::info!("[strata] client ready");

        let inner = ClientInner { sender, sequencer, state, session_backend: config.session_backend };
        Ok((Self { inner: Arc::new(inner) }, updates))
    }

    /// Connect to `addr` over TCP using `config.transport` framing.
    pub async fn connect_tcp(
        addr: impl Into<String>,
        credentials: Credentials,
        config: Config,
    ) -> Result<(Self, UpdateStream), InvocationError> {
        let transport = TcpTransport::new(addr, &config.transport);
        Self::connect(transport, credentials, config).await
    }

    /// Connect with the session stored in `config.session_backend`.
    pub async fn resume<T: Transport>(transport: T, config: Config) -> Result<(Self, UpdateStream), InvocationError> {
        let Some(saved) = config.session_backend.load()? else {
            return Err(InvocationError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no session in {} backend", config.session_backend.name()),
            )));
        };
        Self::connect(transport, saved.into(), config).await
    }

    // ── Invoke ─────────────────────────────────────────────────────────────

    /// Invoke any TL function, handling flood-wait retries.
    ///
    /// Users and chats in the response are added to the entity cache.
    pub async fn invoke<R: RemoteCall>(&self, request: &R) -> Result<R::Return, InvocationError> {
        let body = self.inner.sender.invoke_raw(&request.to_bytes()).await?;
        self.decode_response::<R>(&body)
    }

    /// Send several requests in one container and return a handle per request.
    pub fn invoke_batch<R: RemoteCall>(&self, requests: &[R]) -> Vec<ResponseHandle<R>> {
        let bodies: Vec<Vec<u8>> = requests.iter().map(Serializable::to_bytes).collect();
        let receivers = self.inner.sender.enqueue(bodies.clone());
        receivers
            .into_iter()
            .zip(bodies)
            .map(|(rx, body)| ResponseHandle { rx, body, client: self.clone(), _request: PhantomData })
            .collect()
    }

    fn decode_response<R: RemoteCall>(&self, body: &[u8]) -> Result<R::Return, InvocationError> {
        self.entities().note_response(body);
        Ok(R::Return::from_bytes(body)?)
    }

    /// Invoke a function that returns `Updates` and feed the result to the
    /// update sequencer, so the counters stay in step with the server.
    pub async fn invoke_updates<R>(&self, request: &R) -> Result<enums::Updates, InvocationError>
    where
        R: RemoteCall<Return = enums::Updates>,
    {
        let updates = self.invoke(request).await?;
        self.inner.sequencer.process_updates(updates.clone()).await;
        Ok(updates)
    }

    // ── Updates ────────────────────────────────────────────────────────────

    /// Fetch `updates.getState` and adopt it as the baseline.
    pub async fn sync_update_state(&self) -> Result<types::updates::State, InvocationError> {
        let enums::updates::State::State(state) = self.inner.sender.get_state().await?;
        self.inner.sequencer.set_state(&state).await;
        Ok(state)
    }

    /// Fetch everything missed since the last known state.
    pub async fn catch_up(&self) -> Result<(), InvocationError> {
        self.inner.sequencer.catch_up().await
    }

    /// The committed update counters.
    pub fn update_state(&self) -> UpdateState {
        self.inner.sequencer.durable_state()
    }

    /// The access-hash cache.
    pub fn entities(&self) -> &Arc<EntityCache> {
        self.inner.sequencer.entities()
    }

    // ── Session ────────────────────────────────────────────────────────────

    /// The persistable state of this session.
    pub async fn snapshot(&self) -> Result<PersistedSession, InvocationError> {
        let snapshot = self.inner.sender.snapshot().await?;
        let update_state = self.update_state();
        Ok(PersistedSession {
            auth_key:     snapshot.auth_key,
            salt:         snapshot.salt,
            time_offset:  snapshot.time_offset,
            update_state: (update_state != UpdateState::default()).then_some(update_state),
        })
    }

    /// Write [`Client::snapshot`] to the configured backend.
    pub async fn save_session(&self) -> Result<(), InvocationError> {
        let session = self.snapshot().await?;
        self.inner.session_backend.save(&session)?;
        tracing::info!("[strata] session saved ({})", self.inner.session_backend.name());
        Ok(())
    }

    // ── Connection ─────────────────────────────────────────────────────────

    /// Observe connectivity changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Stop the sender task and wait until it is gone.  Requests still
    /// pending fail with [`InvocationError::Dropped`].
    pub async fn disconnect(&self) {
        self.inner.sender.disconnect();
        let mut state = self.inner.state.clone();
        let _ = state.wait_for(|s| *s == ConnectionState::Disconnected).await;
    }
}

/// Decode pushed updates for the sequencer, and catch up after a reconnect
/// or a long silence.
async fn update_pump(
    sequencer: Sequencer<SenderHandle>,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    idle_timeout: Duration,
) {
    loop {
        let catch_up = match tokio::time::timeout(idle_timeout, inbound.recv()).await {
            Ok(Some(Inbound::Updates(bytes))) => {
                match enums::Updates::from_bytes(&bytes) {
                    Ok(updates) => sequencer.process_updates(updates).await,
                    Err(e) => tracing::warn!("[strata] could not decode pushed updates: {e}"),
                }
                false
            }
            Ok(Some(Inbound::Reconnected)) => true,
            Ok(None) => break,
            Err(_) => {
                tracing::debug!("[strata] no updates for {idle_timeout:?}");
                true
            }
        };
        if catch_up {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                if let Err(e) = sequencer.catch_up().await {
                    tracing::warn!("[strata] catch-up failed: {e}");
                }
            });
        }
    }
    tracing::debug!("[strata] update pump stopped");
}
