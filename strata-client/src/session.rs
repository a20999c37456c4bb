//! Session persistence: auth key, salt, clock offset and update counters.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use strata_crypto::AuthKey;

use crate::pts::UpdateState;

const FORMAT_VERSION: u8 = 1;

/// Everything needed to resume a session.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedSession {
    pub auth_key:     [u8; 256],
    pub salt:         i64,
    pub time_offset:  i32,
    /// Committed update counters, if the account state was ever synced.
    pub update_state: Option<UpdateState>,
}

impl PersistedSession {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(1 + 256 + 8 + 4 + 1);
        b.push(FORMAT_VERSION);
        b.extend_from_slice(&self.auth_key);
        b.extend_from_slice(&self.salt.to_le_bytes());
        b.extend_from_slice(&self.time_offset.to_le_bytes());
        match &self.update_state {
            Some(s) => {
                b.push(1);
                for v in [s.pts, s.qts, s.date, s.seq] {
                    b.extend_from_slice(&v.to_le_bytes());
                }
                let mut channels: Vec<_> = s.channels.iter().collect();
                channels.sort();
                b.extend_from_slice(&(channels.len() as u32).to_le_bytes());
                for (id, pts) in channels {
                    b.extend_from_slice(&id.to_le_bytes());
                    b.extend_from_slice(&pts.to_le_bytes());
                }
            }
            None => b.push(0),
        }
        b
    }

    pub fn from_bytes(buf: &[u8]) -> io::Result<Self> {
        let mut p = 0usize;
        macro_rules! r {
            ($n:expr) => {{
                if p + $n > buf.len() {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated session"));
                }
                let s = &buf[p..p + $n];
                p += $n;
                s
            }};
        }
        macro_rules! int {
            ($t:ty) => {{
                let mut a = [0u8; std::mem::size_of::<$t>()];
                a.copy_from_slice(r!(std::mem::size_of::<$t>()));
                <$t>::from_le_bytes(a)
            }};
        }

        let version = r!(1)[0];
        if version != FORMAT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported session format version {version}"),
            ));
        }
        let mut auth_key = [0u8; 256];
        auth_key.copy_from_slice(r!(256));
        let salt        = int!(i64);
        let time_offset = int!(i32);
        let update_state = match r!(1)[0] {
            0 => None,
            _ => {
                let pts  = int!(i32);
                let qts  = int!(i32);
                let date = int!(i32);
                let seq  = int!(i32);
                let count = int!(u32) as usize;
                let mut channels = HashMap::with_capacity(count.min(4096));
                for _ in 0..count {
                    let id  = int!(i64);
                    let pts = int!(i32);
                    channels.insert(id, pts);
                }
                Some(UpdateState { pts, qts, date, seq, channels })
            }
        };
        Ok(Self { auth_key, salt, time_offset, update_state })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

/// What [`crate::Client::connect`] needs to talk to the server.
///
/// The auth key is produced by a key exchange that happens elsewhere.
#[derive(Clone)]
pub struct Credentials {
    pub auth_key:     AuthKey,
    pub first_salt:   i64,
    pub time_offset:  i32,
    /// Update counters to resume from; `None` starts without a baseline.
    pub update_state: Option<UpdateState>,
    /// Fixed session id.  A random one is chosen when `None`.
    pub session_id:   Option<i64>,
}

impl Credentials {
    pub fn new(auth_key: AuthKey, first_salt: i64) -> Self {
        Self { auth_key, first_salt, time_offset: 0, update_state: None, session_id: None }
    }
}

impl From<PersistedSession> for Credentials {
    fn from(s: PersistedSession) -> Self {
        Self {
            auth_key:     AuthKey::from_bytes(s.auth_key),
            first_salt:   s.salt,
            time_offset:  s.time_offset,
            update_state: s.update_state,
            session_id:   None,
        }
    }
}
