//! Ordered update delivery.
//!
//! The server pushes `Updates` batches whenever it likes, and they may arrive
//! out of order or with holes.  The [`Sequencer`] checks every update against
//! the local counters in [`UpdateState`]:
//!
//! * in order: dispatched immediately;
//! * already applied: dropped;
//! * ahead of the local counter: held until the missing updates arrive, or
//!   until [`SequencerConfig::gap_timeout`] passes, at which point the stream is
//!   resynchronised with `updates.getDifference` / `updates.getChannelDifference`.
//!
//! Dispatched updates reach the application through an [`UpdateStream`].  Each
//! one carries a [`Commit`]; the local counters move as soon as an update is
//! dispatched, the durable counters (the ones worth persisting) only when the
//! application commits it.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use strata_tl::{enums, functions, types};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::entities::{EntityCache, Lookup, PeerKind};
use crate::errors::InvocationError;
use crate::pts::{PtsCheckResult, PtsKey, UpdateState};

// ─── UpdatesSource ────────────────────────────────────────────────────────────

/// The requests the sequencer needs to fill gaps and resolve entities.
///
/// Implemented by the client's sender handle; tests substitute a fake.
pub trait UpdatesSource: Send + Sync + 'static {
    /// `updates.getState`
    fn get_state(&self) -> impl Future<Output = Result<enums::updates::State, InvocationError>> + Send;

    /// `updates.getDifference`
    fn get_difference(
        &self,
        request: functions::updates::GetDifference,
    ) -> impl Future<Output = Result<enums::updates::Difference, InvocationError>> + Send;

    /// `updates.getChannelDifference`
    fn get_channel_difference(
        &self,
        request: functions::updates::GetChannelDifference,
    ) -> impl Future<Output = Result<enums::updates::ChannelDifference, InvocationError>> + Send;

    /// `users.getUsers`
    fn get_users(
        &self,
        id: Vec<enums::InputUser>,
    ) -> impl Future<Output = Result<Vec<enums::User>, InvocationError>> + Send;

    /// `channels.getChannels`
    fn get_channels(
        &self,
        id: Vec<enums::InputChannel>,
    ) -> impl Future<Output = Result<enums::messages::Chats, InvocationError>> + Send;
}

// ─── Config ───────────────────────────────────────────────────────────────────

/// Sequencer tuning.
#[derive(Clone, Debug, PartialEq)]
pub struct SequencerConfig {
    /// How long an update may wait for its predecessors before the stream is
    /// resynchronised.
    pub gap_timeout: Duration,
    /// `pts_total_limit` sent with `updates.getDifference`.
    pub difference_limit: i32,
    /// `limit` sent with `updates.getChannelDifference`.
    pub channel_difference_limit: i32,
    /// Upper bound on difference requests per resync.
    pub max_difference_rounds: usize,
    /// With no updates for this long, the client asks for a difference anyway.
    pub no_updates_timeout: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            gap_timeout: Duration::from_millis(500),
            difference_limit: 1000,
            channel_difference_limit: 100,
            max_difference_rounds: 50,
            no_updates_timeout: Duration::from_secs(15 * 60),
        }
    }
}

// ─── Output ───────────────────────────────────────────────────────────────────

/// What the sequencer hands to the application.
#[derive(Debug)]
pub enum UpdateOrSkipped {
    /// An update, in order.  Call [`Commit::commit`] once it has been handled.
    Update {
        /// The update itself.
        update: enums::Update,
        /// Advances the durable counters past this update.
        commit: Commit,
    },
    /// The server could not provide the missing updates; they are lost and
    /// the stream restarted from the server's current counter.
    Skipped {
        /// The affected channel, or `None` for the account-wide stream.
        channel_id: Option<i64>,
    },
}

impl UpdateOrSkipped {
    /// The update, if this is one.
    pub fn update(&self) -> Option<&enums::Update> {
        match self {
            Self::Update { update, .. } => Some(update),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum CommitTarget {
    Pts(PtsKey, i32),
    Seq { seq: i32, date: i32 },
    State { pts: i32, qts: i32, date: i32, seq: i32 },
}

/// Deferred advance of the durable update state.
#[derive(Debug)]
#[must_use = "the durable state only moves when the update is committed"]
pub struct Commit {
    durable: Arc<Mutex<UpdateState>>,
    targets: Vec<CommitTarget>,
}

impl Commit {
    /// Mark the update as handled.  Counters only ever move forward, so
    /// committing out of order is harmless.
    pub fn commit(self) {
        if self.targets.is_empty() {
            return;
        }
        let mut durable = self.durable.lock().unwrap_or_else(|e| e.into_inner());
        for target in self.targets {
            advance_durable(&mut durable, target);
        }
    }
}

fn advance_durable(state: &mut UpdateState, target: CommitTarget) {
    match target {
        CommitTarget::Pts(key, pts) => state.advance(key, pts),
        CommitTarget::Seq { seq, date } => {
            state.seq = state.seq.max(seq);
            state.date = state.date.max(date);
        }
        CommitTarget::State { pts, qts, date, seq } => {
            state.advance(PtsKey::Main, pts);
            state.advance(PtsKey::Qts, qts);
            state.date = state.date.max(date);
            state.seq = state.seq.max(seq);
        }
    }
}

/// Receiving end of the sequencer.
pub struct UpdateStream {
    rx: mpsc::UnboundedReceiver<UpdateOrSkipped>,
}

impl UpdateStream {
    /// The next update, or `None` once the client is gone.
    pub async fn next(&mut self) -> Option<UpdateOrSkipped> {
        self.rx.recv().await
    }

    /// The next update if one is ready.
    pub fn try_next(&mut self) -> Option<UpdateOrSkipped> {
        self.rx.try_recv().ok()
    }
}

// ─── Internal state ───────────────────────────────────────────────────────────

/// A gap-checked stream.  `Seq` orders whole batches.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
enum Stream {
    Pts(PtsKey),
    Seq,
}

/// What a resync covers.  The account-wide difference fills `Main`, `Qts`
/// and `Seq` at once.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
enum Scope {
    Global,
    Channel(i64),
}

impl Stream {
    fn scope(self) -> Scope {
        match self {
            Stream::Pts(PtsKey::Channel(id)) => Scope::Channel(id),
            _ => Scope::Global,
        }
    }
}

struct Batch {
    updates: Vec<enums::Update>,
    date: i32,
    seq_start: i32,
    seq: i32,
}

enum Held {
    Update(enums::Update),
    Batch(Batch),
}

struct Wait {
    items: Vec<Held>,
    token: CancellationToken,
}

#[derive(Default)]
struct State {
    local: UpdateState,
    waits: HashMap<Stream, BTreeMap<i32, Wait>>,
    resyncing: HashSet<Scope>,
}

/// Side effects collected while the state lock is held.  `out` is sent
/// before the lock is released; the rest runs after.
#[derive(Default)]
struct Effects {
    out: Vec<UpdateOrSkipped>,
    lookups: Vec<Lookup>,
    resyncs: Vec<Scope>,
    timers: Vec<(Stream, i32, CancellationToken)>,
}

enum Kind {
    Gapped { key: PtsKey, pts: i32, count: i32 },
    ChannelTooLong { channel_id: i64, pts: Option<i32> },
    Ungapped,
}

fn classify(update: &enums::Update) -> Kind {
    use enums::Update as U;
    match update {
        U::NewMessage(u) => Kind::Gapped { key: PtsKey::Main, pts: u.pts, count: u.pts_count },
        U::DeleteMessages(u) => Kind::Gapped { key: PtsKey::Main, pts: u.pts, count: u.pts_count },
        U::NewChannelMessage(u) => match u.message.peer_id() {
            Some(enums::Peer::Channel(c)) => Kind::Gapped {
                key: PtsKey::Channel(c.channel_id),
                pts: u.pts,
                count: u.pts_count,
            },
            _ => Kind::Ungapped,
        },
        U::DeleteChannelMessages(u) => Kind::Gapped {
            key: PtsKey::Channel(u.channel_id),
            pts: u.pts,
            count: u.pts_count,
        },
        U::ReadChannelInbox(u) => Kind::Gapped { key: PtsKey::Channel(u.channel_id), pts: u.pts, count: 0 },
        U::NewEncryptedMessage(u) => Kind::Gapped { key: PtsKey::Qts, pts: u.qts, count: 1 },
        U::ChannelTooLong(u) => Kind::ChannelTooLong { channel_id: u.channel_id, pts: u.pts },
        U::UserStatus(_) => Kind::Ungapped,
    }
}

fn message_of(update: &enums::Update) -> Option<&enums::Message> {
    match update {
        enums::Update::NewMessage(u) => Some(&u.message),
        enums::Update::NewChannelMessage(u) => Some(&u.message),
        _ => None,
    }
}

fn lookup_target(lookup: &Lookup) -> Option<(PeerKind, i64)> {
    match lookup {
        Lookup::User(enums::InputUser::FromMessage(u)) => Some((PeerKind::User, u.user_id)),
        Lookup::User(enums::InputUser::User(u)) => Some((PeerKind::User, u.user_id)),
        Lookup::Channel(enums::InputChannel::FromMessage(c)) => Some((PeerKind::Channel, c.channel_id)),
        Lookup::Channel(enums::InputChannel::Channel(c)) => Some((PeerKind::Channel, c.channel_id)),
        _ => None,
    }
}

/// `updateShortMessage` as the `updateNewMessage` it abbreviates.
fn expand_short_message(u: types::UpdateShortMessage) -> enums::Update {
    let peer = enums::Peer::User(types::PeerUser { user_id: u.user_id });
    enums::Update::NewMessage(types::UpdateNewMessage {
        message: enums::Message::Message(types::Message {
            out: u.out,
            id: u.id,
            from_id: (!u.out).then(|| peer.clone()),
            peer_id: peer,
            date: u.date,
            message: u.message,
        }),
        pts: u.pts,
        pts_count: u.pts_count,
    })
}

/// `updateShortChatMessage` as the `updateNewMessage` it abbreviates.
fn expand_short_chat_message(u: types::UpdateShortChatMessage) -> enums::Update {
    enums::Update::NewMessage(types::UpdateNewMessage {
        message: enums::Message::Message(types::Message {
            out: u.out,
            id: u.id,
            from_id: Some(enums::Peer::User(types::PeerUser { user_id: u.from_id })),
            peer_id: enums::Peer::Chat(types::PeerChat { chat_id: u.chat_id }),
            date: u.date,
            message: u.message,
        }),
        pts: u.pts,
        pts_count: u.pts_count,
    })
}

// ─── Sequencer ────────────────────────────────────────────────────────────────

struct Inner<S> {
    source: S,
    config: SequencerConfig,
    state: tokio::sync::Mutex<State>,
    durable: Arc<Mutex<UpdateState>>,
    entities: Arc<EntityCache>,
    out: mpsc::UnboundedSender<UpdateOrSkipped>,
}

/// Orders pushed updates and fills gaps.  Cheap to clone.
pub struct Sequencer<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Sequencer<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S: UpdatesSource> Sequencer<S> {
    /// Create a sequencer starting from `initial` (use
    /// `UpdateState::default()` if nothing was persisted).
    pub fn new(
        source: S,
        entities: Arc<EntityCache>,
        initial: UpdateState,
        config: SequencerConfig,
    ) -> (Self, UpdateStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            source,
            config,
            state: tokio::sync::Mutex::new(State { local: initial.clone(), ..State::default() }),
            durable: Arc::new(Mutex::new(initial)),
            entities,
            out: tx,
        };
        (Self { inner: Arc::new(inner) }, UpdateStream { rx })
    }

    /// The entity cache fed by every batch.
    pub fn entities(&self) -> &Arc<EntityCache> {
        &self.inner.entities
    }

    /// The request source.
    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// The counters of everything dispatched so far.
    pub async fn state(&self) -> UpdateState {
        self.inner.state.lock().await.local.clone()
    }

    /// The counters of everything committed so far.
    pub fn durable_state(&self) -> UpdateState {
        self.lock_durable().clone()
    }

    /// Adopt the account-level counters of a server `updates.state`.
    pub async fn set_state(&self, state: &types::updates::State) {
        self.inner.state.lock().await.local.apply_server_state(state);
        self.lock_durable().apply_server_state(state);
    }

    fn lock_durable(&self) -> std::sync::MutexGuard<'_, UpdateState> {
        self.inner.durable.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Feed one pushed (or returned) `Updates` object.
    pub async fn process_updates(&self, updates: enums::Updates) {
        let mut fx = Effects::default();
        {
            let mut st = self.inner.state.lock().await;
            self.handle_updates(&mut st, updates, &mut fx);
            self.emit(&st, &mut fx);
        }
        self.apply_effects(fx);
    }

    /// Fetch everything missed on the account-wide stream.
    ///
    /// Does nothing until the state has a baseline (see
    /// [`Sequencer::set_state`]).
    pub async fn catch_up(&self) -> Result<(), InvocationError> {
        self.resync(Scope::Global).await
    }

    /// Fetch everything missed in one channel.
    pub async fn resync_channel(&self, channel_id: i64) -> Result<(), InvocationError> {
        self.resync(Scope::Channel(channel_id)).await
    }

    // ── Classification ────────────────────────────────────────────────────

    fn handle_updates(&self, st: &mut State, updates: enums::Updates, fx: &mut Effects) {
        match updates {
            enums::Updates::TooLong => {
                tracing::info!("[strata] updatesTooLong, fetching difference");
                fx.resyncs.push(Scope::Global);
            }
            enums::Updates::UpdateShortMessage(u) => self.handle_update(st, expand_short_message(u), fx),
            enums::Updates::UpdateShortChatMessage(u) => self.handle_update(st, expand_short_chat_message(u), fx),
            enums::Updates::UpdateShort(u) => self.handle_update(st, u.update, fx),
            enums::Updates::Combined(u) => {
                self.inner.entities.extend(&u.users, &u.chats);
                let batch = Batch { updates: u.updates, date: u.date, seq_start: u.seq_start, seq: u.seq };
                self.handle_batch(st, batch, fx);
            }
            enums::Updates::Updates(u) => {
                self.inner.entities.extend(&u.users, &u.chats);
                let batch = Batch { updates: u.updates, date: u.date, seq_start: u.seq, seq: u.seq };
                self.handle_batch(st, batch, fx);
            }
        }
    }

    fn handle_batch(&self, st: &mut State, batch: Batch, fx: &mut Effects) {
        if batch.seq_start == 0 {
            for update in batch.updates {
                self.handle_update(st, update, fx);
            }
            return;
        }
        if st.resyncing.contains(&Scope::Global) {
            self.hold(st, Stream::Seq, batch.seq_start - 1, Held::Batch(batch), fx);
            return;
        }

        let local = st.local.seq;
        let required = batch.seq_start - 1;
        if local == 0 || required == local {
            let before = fx.out.len();
            for update in batch.updates {
                self.handle_update(st, update, fx);
            }
            st.local.seq = batch.seq;
            st.local.date = st.local.date.max(batch.date);
            self.attach_or_commit(fx, before, CommitTarget::Seq { seq: batch.seq, date: batch.date });
            self.chain(st, Stream::Seq, fx);
        } else if required < local {
            // Already seen as a whole; members with their own counter are
            // still checked in case only part of the batch was applied.
            for update in batch.updates {
                if matches!(classify(&update), Kind::Gapped { .. }) {
                    self.handle_update(st, update, fx);
                }
            }
        } else {
            tracing::debug!("[strata] seq gap: local {local}, batch starts at {}", batch.seq_start);
            self.hold(st, Stream::Seq, required, Held::Batch(batch), fx);
        }
    }

    fn handle_update(&self, st: &mut State, update: enums::Update, fx: &mut Effects) {
        if let Some(message) = message_of(&update) {
            if let Some(lookup) = self.inner.entities.note_message(message) {
                fx.lookups.push(lookup);
            }
        }

        match classify(&update) {
            Kind::Ungapped => self.dispatch(fx, update, Vec::new()),
            Kind::ChannelTooLong { channel_id, pts } => {
                let Some(local) = st.local.get(PtsKey::Channel(channel_id)) else {
                    tracing::debug!("[strata] channel {channel_id} too long, but it is not tracked");
                    return;
                };
                if pts.is_some_and(|p| p <= local) {
                    return;
                }
                fx.resyncs.push(Scope::Channel(channel_id));
            }
            Kind::Gapped { key, pts, count } => {
                let stream = Stream::Pts(key);
                if st.resyncing.contains(&stream.scope()) {
                    self.hold(st, stream, pts - count, Held::Update(update), fx);
                    return;
                }
                match st.local.check(key, pts, count) {
                    PtsCheckResult::Ok => {
                        st.local.set(key, pts);
                        self.dispatch(fx, update, vec![CommitTarget::Pts(key, pts)]);
                        self.chain(st, stream, fx);
                    }
                    PtsCheckResult::NoAdvance => self.dispatch(fx, update, Vec::new()),
                    PtsCheckResult::Duplicate => {
                        tracing::debug!("[strata] dropping duplicate update on {key:?} (pts {pts})");
                    }
                    PtsCheckResult::Gap { required, local } => {
                        tracing::debug!("[strata] gap on {key:?}: local {local}, update needs {required}");
                        self.hold(st, stream, required, Held::Update(update), fx);
                    }
                }
            }
        }
    }

    fn handle_held(&self, st: &mut State, item: Held, fx: &mut Effects) {
        match item {
            Held::Update(update) => self.handle_update(st, update, fx),
            Held::Batch(batch) => self.handle_batch(st, batch, fx),
        }
    }

    // ── Waiting ───────────────────────────────────────────────────────────

    fn hold(&self, st: &mut State, stream: Stream, required: i32, item: Held, fx: &mut Effects) {
        let resyncing = st.resyncing.contains(&stream.scope());
        match st.waits.entry(stream).or_default().entry(required) {
            Entry::Occupied(mut wait) => wait.get_mut().items.push(item),
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                if !resyncing {
                    fx.timers.push((stream, required, token.clone()));
                }
                slot.insert(Wait { items: vec![item], token });
            }
        }
    }

    /// Release every wait the local counter of `stream` has caught up with.
    fn chain(&self, st: &mut State, stream: Stream, fx: &mut Effects) {
        loop {
            let local = match stream {
                Stream::Pts(key) => st.local.get(key),
                Stream::Seq => Some(st.local.seq),
            };
            let Some(local) = local else { return };
            let Some(waits) = st.waits.get_mut(&stream) else { return };
            let Some(required) = waits.range(..=local).next().map(|(k, _)| *k) else { return };
            let Some(wait) = waits.remove(&required) else { return };
            if waits.is_empty() {
                st.waits.remove(&stream);
            }
            wait.token.cancel();
            for item in wait.items {
                self.handle_held(st, item, fx);
            }
        }
    }

    /// Re-run everything held in `scope` against the current counters.
    fn reevaluate(&self, st: &mut State, scope: Scope, fx: &mut Effects) {
        let streams: Vec<Stream> = st.waits.keys().copied().filter(|s| s.scope() == scope).collect();
        for stream in streams {
            let Some(waits) = st.waits.remove(&stream) else { continue };
            for (_, wait) in waits {
                wait.token.cancel();
                for item in wait.items {
                    self.handle_held(st, item, fx);
                }
            }
        }
    }

    async fn gap_timed_out(&self, stream: Stream, required: i32, token: CancellationToken) {
        {
            let st = self.inner.state.lock().await;
            let waiting = st.waits.get(&stream).is_some_and(|w| w.contains_key(&required));
            if token.is_cancelled() || !waiting {
                return;
            }
        }
        tracing::info!(
            "[strata] gap on {stream:?} not filled within {:?}, resyncing",
            self.inner.config.gap_timeout
        );
        if let Err(e) = self.resync(stream.scope()).await {
            tracing::warn!("[strata] resync of {stream:?} failed: {e}");
        }
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    fn dispatch(&self, fx: &mut Effects, update: enums::Update, targets: Vec<CommitTarget>) {
        let commit = Commit { durable: Arc::clone(&self.inner.durable), targets };
        fx.out.push(UpdateOrSkipped::Update { update, commit });
    }

    /// Hang `target` on the last update dispatched since `before`, or apply
    /// it right away if nothing was.
    fn attach_or_commit(&self, fx: &mut Effects, before: usize, target: CommitTarget) {
        let last = fx.out[before..].iter_mut().rev().find_map(|item| match item {
            UpdateOrSkipped::Update { commit, .. } => Some(commit),
            UpdateOrSkipped::Skipped { .. } => None,
        });
        match last {
            Some(commit) => commit.targets.push(target),
            None => advance_durable(&mut self.lock_durable(), target),
        }
    }

    /// Send everything dispatched so far to the update stream.  Takes the
    /// locked state so output from concurrent callers cannot interleave.
    fn emit(&self, _locked: &State, fx: &mut Effects) {
        for item in fx.out.drain(..) {
            if self.inner.out.send(item).is_err() {
                tracing::debug!("[strata] update stream dropped, discarding update");
            }
        }
    }

    /// Start the timers, lookups and resyncs collected under the lock.
    fn apply_effects(&self, fx: Effects) {
        debug_assert!(fx.out.is_empty(), "updates must be emitted under the state lock");
        for (stream, required, token) in fx.timers {
            let this = self.clone();
            let timeout = self.inner.config.gap_timeout;
            let cancelled = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancelled.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => this.gap_timed_out(stream, required, token).await,
                }
            });
        }
        for lookup in fx.lookups {
            self.spawn_lookup(lookup);
        }
        for scope in fx.resyncs {
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.resync(scope).await {
                    tracing::warn!("[strata] resync of {scope:?} failed: {e}");
                }
            });
        }
    }

    fn spawn_lookup(&self, lookup: Lookup) {
        let Some((kind, id)) = lookup_target(&lookup) else { return };
        let this = self.clone();
        tokio::spawn(async move {
            let entities = &this.inner.entities;
            let result = match lookup {
                Lookup::User(input) => this.inner.source.get_users(vec![input]).await.map(|users| {
                    entities.extend(&users, &[]);
                }),
                Lookup::Channel(input) => this.inner.source.get_channels(vec![input]).await.map(|chats| {
                    let enums::messages::Chats::Chats(chats) = chats;
                    entities.extend(&[], &chats.chats);
                }),
            };
            if let Err(e) = result {
                tracing::debug!("[strata] lookup of {kind:?} {id} failed: {e}");
            }
            entities.forget_pending(kind, id);
        });
    }

    // ── Resync ────────────────────────────────────────────────────────────

    async fn resync(&self, scope: Scope) -> Result<(), InvocationError> {
        {
            let mut st = self.inner.state.lock().await;
            if !st.resyncing.insert(scope) {
                return Ok(());
            }
            for (stream, waits) in st.waits.iter() {
                if stream.scope() == scope {
                    waits.values().for_each(|w| w.token.cancel());
                }
            }
        }

        let result = match scope {
            Scope::Global => self.get_difference().await,
            Scope::Channel(id) => self.get_channel_difference(id).await,
        };

        let mut fx = Effects::default();
        {
            let mut st = self.inner.state.lock().await;
            st.resyncing.remove(&scope);
            self.reevaluate(&mut st, scope, &mut fx);
            self.emit(&st, &mut fx);
        }
        self.apply_effects(fx);
        result
    }

    async fn get_difference(&self) -> Result<(), InvocationError> {
        for _ in 0..self.inner.config.max_difference_rounds {
            let request = {
                let st = self.inner.state.lock().await;
                if st.local.pts == 0 {
                    tracing::debug!("[strata] no update state yet, skipping difference");
                    return Ok(());
                }
                functions::updates::GetDifference {
                    pts: st.local.pts,
                    pts_limit: None,
                    pts_total_limit: Some(self.inner.config.difference_limit),
                    date: st.local.date,
                    qts: st.local.qts,
                    qts_limit: None,
                }
            };
            let difference = self.inner.source.get_difference(request).await?;

            let mut fx = Effects::default();
            let done = {
                let mut st = self.inner.state.lock().await;
                let done = self.apply_difference(&mut st, difference, &mut fx);
                self.emit(&st, &mut fx);
                done
            };
            self.apply_effects(fx);
            if done {
                return Ok(());
            }
        }
        tracing::warn!(
            "[strata] difference still incomplete after {} rounds",
            self.inner.config.max_difference_rounds
        );
        Ok(())
    }

    fn apply_difference(&self, st: &mut State, difference: enums::updates::Difference, fx: &mut Effects) -> bool {
        use enums::updates::Difference as D;
        let (new_messages, other_updates, chats, users, state, done) = match difference {
            D::Empty(d) => {
                st.local.date = d.date;
                st.local.seq = d.seq;
                advance_durable(&mut self.lock_durable(), CommitTarget::Seq { seq: d.seq, date: d.date });
                return true;
            }
            D::TooLong(d) => {
                tracing::warn!("[strata] difference too long, restarting from pts {}", d.pts);
                st.local.pts = d.pts;
                self.lock_durable().pts = d.pts;
                fx.out.push(UpdateOrSkipped::Skipped { channel_id: None });
                return true;
            }
            D::Difference(d) => (d.new_messages, d.other_updates, d.chats, d.users, d.state, true),
            D::Slice(d) => (d.new_messages, d.other_updates, d.chats, d.users, d.intermediate_state, false),
        };
        let enums::updates::State::State(state) = state;
        tracing::debug!(
            "[strata] difference: {} messages, {} other updates, now at pts {}",
            new_messages.len(),
            other_updates.len(),
            state.pts
        );

        self.inner.entities.extend(&users, &chats);
        let before = fx.out.len();
        let recovered = new_messages.into_iter().map(|message| {
            enums::Update::NewMessage(types::UpdateNewMessage { message, pts: 0, pts_count: 0 })
        });
        for update in recovered.chain(other_updates) {
            self.recover(st, update, fx);
        }
        st.local.apply_server_state(&state);
        self.attach_or_commit(
            fx,
            before,
            CommitTarget::State { pts: state.pts, qts: state.qts, date: state.date, seq: state.seq },
        );
        done
    }

    async fn get_channel_difference(&self, channel_id: i64) -> Result<(), InvocationError> {
        let key = PtsKey::Channel(channel_id);
        for _ in 0..self.inner.config.max_difference_rounds {
            let Some(pts) = self.inner.state.lock().await.local.get(key) else {
                return Ok(());
            };
            let Some(channel) = self.inner.entities.input_channel(channel_id) else {
                tracing::warn!("[strata] no access hash for channel {channel_id}, dropping its state");
                let mut st = self.inner.state.lock().await;
                st.local.remove_channel(channel_id);
                self.lock_durable().remove_channel(channel_id);
                let mut fx = Effects::default();
                fx.out.push(UpdateOrSkipped::Skipped { channel_id: Some(channel_id) });
                self.emit(&st, &mut fx);
                return Ok(());
            };
            let request = functions::updates::GetChannelDifference {
                force: false,
                channel,
                filter: enums::ChannelMessagesFilter::Empty,
                pts,
                limit: self.inner.config.channel_difference_limit,
            };
            let difference = self.inner.source.get_channel_difference(request).await?;

            let mut fx = Effects::default();
            let done = {
                let mut st = self.inner.state.lock().await;
                let done = self.apply_channel_difference(&mut st, channel_id, difference, &mut fx);
                self.emit(&st, &mut fx);
                done
            };
            self.apply_effects(fx);
            if done {
                return Ok(());
            }
        }
        tracing::warn!("[strata] channel {channel_id} difference still incomplete");
        Ok(())
    }

    fn apply_channel_difference(
        &self,
        st: &mut State,
        channel_id: i64,
        difference: enums::updates::ChannelDifference,
        fx: &mut Effects,
    ) -> bool {
        use enums::updates::ChannelDifference as D;
        let key = PtsKey::Channel(channel_id);
        match difference {
            D::Empty(d) => {
                st.local.set(key, d.pts);
                self.lock_durable().advance(key, d.pts);
                d.r#final
            }
            D::TooLong(d) => {
                tracing::warn!("[strata] channel {channel_id} difference too long, restarting from pts {}", d.pts);
                self.inner.entities.extend(&d.users, &d.chats);
                st.local.set(key, d.pts);
                self.lock_durable().set(key, d.pts);
                fx.out.push(UpdateOrSkipped::Skipped { channel_id: Some(channel_id) });
                true
            }
            D::Difference(d) => {
                tracing::debug!(
                    "[strata] channel {channel_id} difference: {} messages, now at pts {}",
                    d.new_messages.len(),
                    d.pts
                );
                self.inner.entities.extend(&d.users, &d.chats);
                let before = fx.out.len();
                let recovered = d.new_messages.into_iter().map(|message| {
                    enums::Update::NewChannelMessage(types::UpdateNewChannelMessage { message, pts: 0, pts_count: 0 })
                });
                for update in recovered.chain(d.other_updates) {
                    self.recover(st, update, fx);
                }
                st.local.set(key, d.pts);
                self.attach_or_commit(fx, before, CommitTarget::Pts(key, d.pts));
                d.r#final
            }
        }
    }

    /// Dispatch an update recovered from a difference, without gap checks.
    fn recover(&self, st: &mut State, update: enums::Update, fx: &mut Effects) {
        if let Some(message) = message_of(&update) {
            if let Some(lookup) = self.inner.entities.note_message(message) {
                fx.lookups.push(lookup);
            }
        }
        if let Kind::ChannelTooLong { channel_id, .. } = classify(&update) {
            if st.local.get(PtsKey::Channel(channel_id)).is_some() {
                fx.resyncs.push(Scope::Channel(channel_id));
            }
            return;
        }
        self.dispatch(fx, update, Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_expand_to_new_message() {
        let update = expand_short_chat_message(types::UpdateShortChatMessage {
            out: false,
            id: 9,
            from_id: 4,
            chat_id: 3,
            message: "hi".into(),
            pts: 12,
            pts_count: 1,
            date: 100,
        });
        let enums::Update::NewMessage(u) = update else { panic!("expected updateNewMessage") };
        assert_eq!((u.pts, u.pts_count), (12, 1));
        assert_eq!(u.message.peer_id(), Some(&enums::Peer::Chat(types::PeerChat { chat_id: 3 })));
        assert_eq!(u.message.from_id(), Some(&enums::Peer::User(types::PeerUser { user_id: 4 })));

        let outgoing = expand_short_message(types::UpdateShortMessage {
            out: true,
            id: 1,
            user_id: 8,
            message: String::new(),
            pts: 2,
            pts_count: 1,
            date: 0,
        });
        assert_eq!(message_of(&outgoing).and_then(|m| m.from_id()), None);
    }

    #[test]
    fn channel_updates_are_keyed_by_channel() {
        let update = enums::Update::NewChannelMessage(types::UpdateNewChannelMessage {
            message: enums::Message::Empty(types::MessageEmpty {
                id: 1,
                peer_id: Some(enums::Peer::Channel(types::PeerChannel { channel_id: 7 })),
            }),
            pts: 10,
            pts_count: 1,
        });
        assert!(matches!(classify(&update), Kind::Gapped { key: PtsKey::Channel(7), pts: 10, count: 1 }));

        let read = enums::Update::ReadChannelInbox(types::UpdateReadChannelInbox { channel_id: 7, max_id: 3, pts: 11 });
        assert!(matches!(classify(&read), Kind::Gapped { count: 0, .. }));
    }

    #[test]
    fn commit_only_moves_forward() {
        let durable = Arc::new(Mutex::new(UpdateState::default()));
        let commit = |targets| Commit { durable: Arc::clone(&durable), targets };
        commit(vec![CommitTarget::Pts(PtsKey::Channel(7), 105)]).commit();
        commit(vec![CommitTarget::Pts(PtsKey::Channel(7), 100)]).commit();
        commit(vec![CommitTarget::Seq { seq: 4, date: 50 }]).commit();
        let state = durable.lock().unwrap().clone();
        assert_eq!(state.get(PtsKey::Channel(7)), Some(105));
        assert_eq!((state.seq, state.date), (4, 50));
    }

    struct Offline;

    impl UpdatesSource for Offline {
        async fn get_state(&self) -> Result<enums::updates::State, InvocationError> {
            Err(InvocationError::Dropped)
        }

        async fn get_difference(
            &self,
            _: functions::updates::GetDifference,
        ) -> Result<enums::updates::Difference, InvocationError> {
            Err(InvocationError::Dropped)
        }

        async fn get_channel_difference(
            &self,
            _: functions::updates::GetChannelDifference,
        ) -> Result<enums::updates::ChannelDifference, InvocationError> {
            Err(InvocationError::Dropped)
        }

        async fn get_users(&self, _: Vec<enums::InputUser>) -> Result<Vec<enums::User>, InvocationError> {
            Err(InvocationError::Dropped)
        }

        async fn get_channels(&self, _: Vec<enums::InputChannel>) -> Result<enums::messages::Chats, InvocationError> {
            Err(InvocationError::Dropped)
        }
    }

    fn channel_message(channel_id: i64, pts: i32) -> enums::Updates {
        let update = enums::Update::NewChannelMessage(types::UpdateNewChannelMessage {
            message: enums::Message::Empty(types::MessageEmpty {
                id: pts,
                peer_id: Some(enums::Peer::Channel(types::PeerChannel { channel_id })),
            }),
            pts,
            pts_count: 1,
        });
        enums::Updates::Updates(types::Updates {
            updates: vec![update],
            users: Vec::new(),
            chats: Vec::new(),
            date: 0,
            seq: 0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn filled_gaps_leave_no_wait_entries() {
        let mut initial = UpdateState::default();
        for channel_id in 1..=50 {
            initial.set(PtsKey::Channel(channel_id), 10);
        }
        let (sequencer, mut stream) =
            Sequencer::new(Offline, Arc::new(EntityCache::new()), initial, SequencerConfig::default());

        for channel_id in 1..=50 {
            sequencer.process_updates(channel_message(channel_id, 12)).await;
        }
        assert_eq!(sequencer.inner.state.lock().await.waits.len(), 50);

        for channel_id in 1..=50 {
            sequencer.process_updates(channel_message(channel_id, 11)).await;
        }
        assert!(sequencer.inner.state.lock().await.waits.is_empty());

        let mut dispatched = 0;
        while stream.try_next().is_some() {
            dispatched += 1;
        }
        assert_eq!(dispatched, 100);
    }
}
