//! Update sequence counters.
//!
//! The server assigns a monotonically-increasing counter called **pts** to
//! every update that changes message boxes (one for the account, one per
//! channel), **qts** to secret-chat updates and **seq** to whole `updates`
//! batches.  A pts-carrying update also says how many steps it covers
//! (`pts_count`): it may only be applied once the local counter reached
//! `pts - pts_count`.

use std::collections::HashMap;

use strata_tl::types;

/// Which gap-counted stream an update belongs to.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PtsKey {
    /// The account's message box.
    Main,
    /// The secret-chat counter.
    Qts,
    /// A channel's message box.
    Channel(i64),
}

/// Tracks update counters so gaps can be detected and filled.
///
/// A zero (or absent, for channels) counter means "unknown": the first
/// update seen for that stream is accepted and becomes the baseline.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateState {
    /// Account-wide pts.
    pub pts: i32,
    /// Secret-chat counter.
    pub qts: i32,
    /// Date of the last known update (Unix timestamp).
    pub date: i32,
    /// Combined updates sequence.
    pub seq: i32,
    /// Per-channel pts.
    pub channels: HashMap<i64, i32>,
}

/// Outcome of [`UpdateState::check`].
#[derive(Debug, PartialEq, Eq)]
pub enum PtsCheckResult {
    /// In order (or no baseline yet): apply the update.
    Ok,
    /// `pts_count == 0`: dispatch without moving the counter.
    NoAdvance,
    /// The update is ahead of the local counter; it needs `required` first.
    Gap {
        /// The counter value this update builds on.
        required: i32,
        /// The current local counter.
        local: i32,
    },
    /// The update was already applied; discard it.
    Duplicate,
}

impl UpdateState {
    /// Take the account-level counters from a server `updates.state`.
    ///
    /// Channel counters are kept.
    pub fn apply_server_state(&mut self, state: &types::updates::State) {
        self.pts  = state.pts;
        self.qts  = state.qts;
        self.date = state.date;
        self.seq  = state.seq;
    }

    /// Build a state from a server `updates.state`.
    pub fn from_server_state(state: &types::updates::State) -> Self {
        let mut s = Self::default();
        s.apply_server_state(state);
        s
    }

    /// The counter of `key`, or `None` if unknown.
    pub fn get(&self, key: PtsKey) -> Option<i32> {
        let v = match key {
            PtsKey::Main => self.pts,
            PtsKey::Qts => self.qts,
            PtsKey::Channel(id) => return self.channels.get(&id).copied(),
        };
        (v != 0).then_some(v)
    }

    /// Overwrite the counter of `key`.
    pub fn set(&mut self, key: PtsKey, value: i32) {
        match key {
            PtsKey::Main => self.pts = value,
            PtsKey::Qts => self.qts = value,
            PtsKey::Channel(id) => {
                self.channels.insert(id, value);
            }
        }
    }

    /// Move the counter of `key` forward to `value` (never backwards).
    pub fn advance(&mut self, key: PtsKey, value: i32) {
        if self.get(key).is_none_or(|cur| value > cur) {
            self.set(key, value);
        }
    }

    /// Forget a channel's counter.
    pub fn remove_channel(&mut self, channel_id: i64) {
        self.channels.remove(&channel_id);
    }

    /// Classify an update carrying `pts` / `pts_count` on stream `key`.
    pub fn check(&self, key: PtsKey, pts: i32, pts_count: i32) -> PtsCheckResult {
        let Some(local) = self.get(key) else {
            return PtsCheckResult::Ok;
        };
        if pts_count == 0 {
            return PtsCheckResult::NoAdvance;
        }
        let required = pts - pts_count;
        if required == local {
            PtsCheckResult::Ok
        } else if required < local {
            PtsCheckResult::Duplicate
        } else {
            PtsCheckResult::Gap { required, local }
        }
    }
}
