//! The sender task.
//!
//! One tokio task owns the connection: the [`Transport`], the [`Mtp`] packer
//! (and with it the session's salt, sequence counters and message-id clock)
//! and the table of requests in flight.  Everything else talks to it through
//! a [`SenderHandle`].
//!
//! The task loops over three events: a request from a handle, a frame from
//! the transport, and the keepalive timer.  Before waiting it flushes
//! everything queued into as few frames as the container ceilings allow.
//! When the transport fails, in-flight requests go back to the queue and are
//! sent again once the connection is re-established.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use strata_mtproto::{DeserializeError, Deserialization, Mtp, MsgId, RequestError};
use strata_tl::{Deserializable, RemoteCall, Serializable, enums, functions};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, sleep};

use crate::errors::{InvocationError, RpcError};
use crate::retry::{RetryContext, RetryPolicy};
use crate::sequencer::UpdatesSource;
use crate::transport::Transport;

/// Connectivity of the sender task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connecting or reconnecting.
    Connecting,
    /// The transport is up.
    Connected,
    /// The task has stopped; every further request fails.
    Disconnected,
}

/// A request waiting to be sent or answered.
///
/// The result slot is a oneshot sender, so a request is answered at most
/// once.  Internal requests (keepalive pings) have no slot.
pub struct Pending {
    body: Vec<u8>,
    tx: Option<oneshot::Sender<Result<Vec<u8>, InvocationError>>>,
}

impl Pending {
    fn new(body: Vec<u8>) -> (Self, oneshot::Receiver<Result<Vec<u8>, InvocationError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { body, tx: Some(tx) }, rx)
    }

    /// Whether nobody is waiting for the answer anymore.
    fn is_abandoned(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }

    fn resolve(self, result: Result<Vec<u8>, InvocationError>) {
        if let Some(tx) = self.tx {
            let _ = tx.send(result);
        }
    }
}

/// Session values worth persisting, read from the sender task.
#[derive(Clone, Debug)]
pub(crate) struct SessionSnapshot {
    pub auth_key: [u8; 256],
    pub salt: i64,
    pub time_offset: i32,
}

pub(crate) enum Request {
    Invoke(Vec<Pending>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Disconnect,
}

/// What the sender task passes to the update pump.
pub(crate) enum Inbound {
    /// A serialized `Updates` object.
    Updates(Vec<u8>),
    /// The connection was re-established; updates may have been missed.
    Reconnected,
}

/// Keepalive and reconnect settings.
#[derive(Clone, Debug)]
pub(crate) struct SenderOptions {
    pub ping_interval: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

// ─── Actor ────────────────────────────────────────────────────────────────────

enum Failure {
    Io(io::Error),
    Transport(i32),
    Frame(String),
}

struct Sender<T> {
    transport: T,
    mtp: Mtp,
    options: SenderOptions,
    requests: mpsc::UnboundedReceiver<Request>,
    inbound: mpsc::UnboundedSender<Inbound>,
    state: watch::Sender<ConnectionState>,
    queue: VecDeque<Pending>,
    in_flight: HashMap<MsgId, Pending>,
}

/// Connect `transport` and start the sender task.
pub(crate) async fn spawn<T: Transport>(
    mut transport: T,
    mtp: Mtp,
    options: SenderOptions,
    retry_policy: Arc<dyn RetryPolicy>,
) -> Result<(SenderHandle, mpsc::UnboundedReceiver<Inbound>, watch::Receiver<ConnectionState>), InvocationError> {
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    transport.connect().await?;
    state_tx.send_replace(ConnectionState::Connected);

    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let sender = Sender {
        transport,
        mtp,
        options,
        requests: req_rx,
        inbound: inbound_tx,
        state: state_tx,
        queue: VecDeque::new(),
        in_flight: HashMap::new(),
    };
    tokio::spawn(sender.run());

    Ok((SenderHandle { tx: req_tx, retry_policy }, inbound_rx, state_rx))
}

impl<T: Transport> Sender<T> {
    async fn run(mut self) {
        let period = self.options.ping_interval;
        let mut ping = tokio::time::interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            if let Err(failure) = self.flush().await {
                match self.recover(failure).await {
                    Ok(()) => continue,
                    Err(e) => break e,
                }
            }

            let failure = tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Invoke(pending)) => {
                        self.queue.extend(pending);
                        None
                    }
                    Some(Request::Snapshot(tx)) => {
                        let _ = tx.send(self.snapshot());
                        None
                    }
                    Some(Request::Disconnect) | None => break InvocationError::Dropped,
                },
                frame = self.transport.recv() => match frame {
                    Ok(frame) => self.on_frame(frame).err(),
                    Err(e) => Some(Failure::Io(e)),
                },
                _ = ping.tick() => {
                    self.queue_ping();
                    None
                }
            };

            if let Some(failure) = failure {
                if let Err(e) = self.recover(failure).await {
                    break e;
                }
            }
        };

        tracing::info!("[strata] sender stopping: {exit}");
        self.fail_all(&exit);
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            if let Request::Invoke(pending) = request {
                pending.into_iter().for_each(|p| p.resolve(Err(InvocationError::Dropped)));
            }
        }
        self.transport.disconnect().await;
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Pack and send everything queued, plus pending acknowledgements.
    async fn flush(&mut self) -> Result<(), Failure> {
        loop {
            while let Some(pending) = self.queue.front() {
                if pending.is_abandoned() {
                    self.queue.pop_front();
                    continue;
                }
                let Some(msg_id) = self.mtp.push(&pending.body) else { break };
                if let Some(pending) = self.queue.pop_front() {
                    self.in_flight.insert(msg_id, pending);
                }
            }
            let Some(frame) = self.mtp.finalize() else { return Ok(()) };
            self.transport.send(&frame).await.map_err(Failure::Io)?;
            if self.queue.is_empty() {
                return Ok(());
            }
        }
    }

    fn on_frame(&mut self, mut frame: Vec<u8>) -> Result<(), Failure> {
        match self.mtp.deserialize(&mut frame) {
            Ok(result) => {
                self.on_deserialization(result);
                Ok(())
            }
            Err(DeserializeError::Transport { code }) => Err(Failure::Transport(code)),
            Err(DeserializeError::Decrypt(e)) => Err(Failure::Frame(e.to_string())),
        }
    }

    fn on_deserialization(&mut self, result: Deserialization) {
        let mut retries = Vec::new();
        for (msg_id, outcome) in result.rpc_results {
            let Some(pending) = self.in_flight.remove(&msg_id) else {
                tracing::debug!("[strata] result for unknown message {msg_id}");
                continue;
            };
            match outcome {
                Ok(body) => pending.resolve(Ok(body)),
                Err(RequestError::Rpc { code, message }) => {
                    pending.resolve(Err(RpcError::from_telegram(code, &message).into()));
                }
                Err(RequestError::BadMessage { code }) => {
                    tracing::error!("[strata] message {msg_id} rejected with code {code}");
                    pending.resolve(Err(InvocationError::BadMessage { code }));
                }
                Err(RequestError::Retry) => retries.push((msg_id, pending)),
                Err(RequestError::Deserialize(reason)) => {
                    tracing::warn!("[strata] result for {msg_id} is unreadable: {reason}");
                    pending.resolve(Err(InvocationError::Deserialize(reason)));
                }
            }
        }
        if !retries.is_empty() {
            tracing::debug!("[strata] resending {} message(s)", retries.len());
            self.requeue_front(retries);
        }

        for update in result.updates {
            let _ = self.inbound.send(Inbound::Updates(update));
        }
    }

    /// Put requests back at the head of the queue, oldest first.
    fn requeue_front(&mut self, mut pending: Vec<(MsgId, Pending)>) {
        pending.sort_by_key(|(msg_id, _)| *msg_id);
        for (_, p) in pending.into_iter().rev() {
            self.queue.push_front(p);
        }
    }

    fn queue_ping(&mut self) {
        let mut rnd = [0u8; 8];
        getrandom::getrandom(&mut rnd).expect("getrandom");
        let ping = functions::PingDelayDisconnect {
            ping_id: i64::from_le_bytes(rnd),
            disconnect_delay: self.options.ping_interval.as_secs() as i32 + 15,
        };
        self.queue.push_back(Pending { body: ping.to_bytes(), tx: None });
    }

    fn snapshot(&self) -> SessionSnapshot {
        let session = self.mtp.session();
        SessionSnapshot {
            auth_key: session.auth_key().to_bytes(),
            salt: session.salt,
            time_offset: session.time_offset,
        }
    }

    // ── Failure handling ──────────────────────────────────────────────────

    async fn recover(&mut self, failure: Failure) -> Result<(), InvocationError> {
        match failure {
            Failure::Transport(code) if code == -404 => {
                tracing::error!("[strata] server does not know the auth key (transport error -404)");
                return Err(InvocationError::Transport { code });
            }
            Failure::Transport(code) => {
                tracing::warn!("[strata] transport error {code}, reconnecting");
                self.requeue_in_flight();
            }
            Failure::Io(e) => {
                tracing::warn!("[strata] connection lost: {e}");
                self.requeue_in_flight();
            }
            Failure::Frame(reason) => {
                tracing::error!("[strata] corrupt frame ({reason}), dropping connection");
                for (_, pending) in self.in_flight.drain() {
                    pending.resolve(Err(InvocationError::Frame(reason.clone())));
                }
            }
        }
        self.reconnect().await
    }

    fn requeue_in_flight(&mut self) {
        let in_flight: Vec<_> = self.in_flight.drain().collect();
        self.requeue_front(in_flight);
    }

    async fn reconnect(&mut self) -> Result<(), InvocationError> {
        self.state.send_replace(ConnectionState::Connecting);
        self.transport.disconnect().await;
        self.mtp.reset();

        let mut last_error = io::Error::other("no reconnect attempts configured");
        for attempt in 1..=self.options.reconnect_attempts {
            sleep(self.options.reconnect_delay * attempt).await;
            match self.transport.connect().await {
                Ok(()) => {
                    tracing::info!("[strata] reconnected (attempt {attempt})");
                    self.state.send_replace(ConnectionState::Connected);
                    let _ = self.inbound.send(Inbound::Reconnected);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("[strata] reconnect attempt {attempt} failed: {e}");
                    last_error = e;
                }
            }
        }
        Err(InvocationError::Io(last_error))
    }

    fn fail_all(&mut self, error: &InvocationError) {
        let pending = self.in_flight.drain().map(|(_, p)| p).chain(self.queue.drain(..));
        for p in pending {
            p.resolve(Err(copy_error(error)));
        }
    }
}

/// Duplicate `error` for every request that fails with it.
fn copy_error(error: &InvocationError) -> InvocationError {
    match error {
        InvocationError::Rpc(e) => InvocationError::Rpc(e.clone()),
        InvocationError::Io(e) => InvocationError::Io(io::Error::new(e.kind(), e.to_string())),
        InvocationError::Deserialize(s) => InvocationError::Deserialize(s.clone()),
        InvocationError::Dropped => InvocationError::Dropped,
        InvocationError::Transport { code } => InvocationError::Transport { code: *code },
        InvocationError::Frame(s) => InvocationError::Frame(s.clone()),
        InvocationError::BadMessage { code } => InvocationError::BadMessage { code: *code },
    }
}

// ─── SenderHandle ─────────────────────────────────────────────────────────────

/// Cheap, cloneable access to the sender task.
#[derive(Clone)]
pub struct SenderHandle {
    tx: mpsc::UnboundedSender<Request>,
    retry_policy: Arc<dyn RetryPolicy>,
}

impl SenderHandle {
    /// Queue several bodies at once so they share a container.
    pub(crate) fn enqueue(
        &self,
        bodies: Vec<Vec<u8>>,
    ) -> Vec<oneshot::Receiver<Result<Vec<u8>, InvocationError>>> {
        let (pending, receivers): (Vec<_>, Vec<_>) = bodies.into_iter().map(Pending::new).unzip();
        // A closed channel drops the slots, which the receivers see as `Dropped`.
        let _ = self.tx.send(Request::Invoke(pending));
        receivers
    }

    async fn call_once(&self, body: &[u8]) -> Result<Vec<u8>, InvocationError> {
        let (pending, rx) = Pending::new(body.to_vec());
        self.tx.send(Request::Invoke(vec![pending])).map_err(|_| InvocationError::Dropped)?;
        rx.await.map_err(|_| InvocationError::Dropped)?
    }

    /// Send a serialized request and wait for its serialized result,
    /// retrying as the retry policy allows.
    pub async fn invoke_raw(&self, body: &[u8]) -> Result<Vec<u8>, InvocationError> {
        let first = self.call_once(body).await;
        self.retry(body, first).await
    }

    /// Run the retry policy over `outcome`, the result of a first attempt at
    /// `body`, sending `body` again for as long as the policy asks to.
    pub(crate) async fn retry(
        &self,
        body: &[u8],
        mut outcome: Result<Vec<u8>, InvocationError>,
    ) -> Result<Vec<u8>, InvocationError> {
        let mut fail_count   = NonZeroU32::MIN;
        let mut slept_so_far = Duration::default();
        loop {
            let error = match outcome {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };
            let ctx = RetryContext { fail_count, slept_so_far, error };
            match self.retry_policy.should_retry(&ctx) {
                ControlFlow::Continue(delay) => {
                    sleep(delay).await;
                    slept_so_far += delay;
                    fail_count = fail_count.saturating_add(1);
                }
                ControlFlow::Break(()) => return Err(ctx.error),
            }
            outcome = self.call_once(body).await;
        }
    }

    /// Invoke a typed request.
    pub async fn invoke<R: RemoteCall>(&self, request: &R) -> Result<R::Return, InvocationError> {
        let body = self.invoke_raw(&request.to_bytes()).await?;
        Ok(R::Return::from_bytes(&body)?)
    }

    pub(crate) async fn snapshot(&self) -> Result<SessionSnapshot, InvocationError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Request::Snapshot(tx)).map_err(|_| InvocationError::Dropped)?;
        rx.await.map_err(|_| InvocationError::Dropped)
    }

    pub(crate) fn disconnect(&self) {
        let _ = self.tx.send(Request::Disconnect);
    }
}

impl UpdatesSource for SenderHandle {
    async fn get_state(&self) -> Result<enums::updates::State, InvocationError> {
        self.invoke(&functions::updates::GetState {}).await
    }

    async fn get_difference(
        &self,
        request: functions::updates::GetDifference,
    ) -> Result<enums::updates::Difference, InvocationError> {
        self.invoke(&request).await
    }

    async fn get_channel_difference(
        &self,
        request: functions::updates::GetChannelDifference,
    ) -> Result<enums::updates::ChannelDifference, InvocationError> {
        self.invoke(&request).await
    }

    async fn get_users(&self, id: Vec<enums::InputUser>) -> Result<Vec<enums::User>, InvocationError> {
        self.invoke(&functions::users::GetUsers { id }).await
    }

    async fn get_channels(&self, id: Vec<enums::InputChannel>) -> Result<enums::messages::Chats, InvocationError> {
        self.invoke(&functions::channels::GetChannels { id }).await
    }
}
