//! Store sessions: one ordered store plus its extraction mode, exposed
//! through a packet-level request/response surface.
//!
//! A [`Session`] plays the part of a device node. Callers either use the
//! typed operations (`write`, `read`, `set_mode`) or the byte-level
//! [`Device`] trait, which is what a transport (file handle, RPC, in-process
//! call) forwards 12-byte packets to.

use crate::error::{RbVaultError, Result};
use crate::protocol::{decode, Packet, PACKET_LEN};
use crate::store::{Entry, ExtractionMode, OrderedStore};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use tracing::debug;

/// Number of sessions a run owns.
pub const SESSION_COUNT: usize = 2;

/// 1-based session number as written in scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(usize);

impl SessionId {
    pub const FIRST: SessionId = SessionId(1);
    pub const SECOND: SessionId = SessionId(2);

    /// Validate a script session number.
    pub fn new(number: i64) -> Result<Self> {
        match usize::try_from(number) {
            Ok(n) if (1..=SESSION_COUNT).contains(&n) => Ok(SessionId(n)),
            _ => Err(RbVaultError::UnknownSession(number)),
        }
    }

    pub fn number(self) -> usize {
        self.0
    }

    fn index(self) -> usize {
        self.0 - 1
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Byte-level surface a transport exposes for one session.
pub trait Device {
    /// Submit one encoded write packet.
    fn submit_write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Extract one entry and return it encoded; `Empty` when nothing is stored.
    fn submit_read(&mut self) -> Result<[u8; PACKET_LEN]>;

    /// Control call; code 0 selects max extraction, 1 selects min.
    fn submit_control(&mut self, code: i64) -> Result<()>;
}

/// One ordered store and its extraction mode.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    store: OrderedStore,
    mode: ExtractionMode,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            store: OrderedStore::new(),
            mode: ExtractionMode::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn search(&self, key: i32) -> Option<Entry> {
        self.store.search(key)
    }

    /// Entries in ascending key order, without extracting them.
    pub fn entries(&self) -> Vec<Entry> {
        self.store.iter().collect()
    }

    /// Upsert when the insert flag is set, delete otherwise. Never fails.
    pub fn write(&mut self, packet: &Packet) {
        if packet.is_insert() {
            debug!(session = %self.id, key = packet.key, payload = %packet.payload, "upsert");
            self.store.upsert(packet.key, packet.payload);
        } else {
            debug!(session = %self.id, key = packet.key, "delete");
            self.store.remove(packet.key);
        }
    }

    /// Extract the entry selected by the current mode.
    pub fn read(&mut self) -> Result<Packet> {
        let entry = self.store.pop_extreme(self.mode)?;
        debug!(session = %self.id, key = entry.key, mode = ?self.mode, "extracted");
        Ok(Packet::response(entry))
    }

    /// Select the extraction mode for subsequent reads. Rejected flags leave
    /// the mode unchanged.
    pub fn set_mode(&mut self, flag: i64) -> Result<()> {
        self.mode = ExtractionMode::try_from(flag)?;
        debug!(session = %self.id, mode = ?self.mode, "mode changed");
        Ok(())
    }

    /// Extract and discard every entry, then reset the mode to `Max`.
    /// Returns the number of entries released.
    pub fn drain_all(&mut self) -> usize {
        let mut drained = 0;
        while self.read().is_ok() {
            drained += 1;
        }
        self.mode = ExtractionMode::Max;
        drained
    }
}

impl Device for Session {
    fn submit_write(&mut self, bytes: &[u8]) -> Result<()> {
        let packet = decode(bytes)?;
        self.write(&packet);
        Ok(())
    }

    fn submit_read(&mut self) -> Result<[u8; PACKET_LEN]> {
        self.read().map(|packet| packet.to_bytes())
    }

    fn submit_control(&mut self, code: i64) -> Result<()> {
        self.set_mode(code)
    }
}

/// The pair of independent sessions owned by a run.
#[derive(Debug)]
pub struct Sessions {
    slots: [Mutex<Session>; SESSION_COUNT],
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new()
    }
}

impl Sessions {
    pub fn new() -> Self {
        Self {
            slots: [
                Mutex::new(Session::new(SessionId::FIRST)),
                Mutex::new(Session::new(SessionId::SECOND)),
            ],
        }
    }

    /// Lock the session with the given id.
    pub fn lock(&self, id: SessionId) -> MutexGuard<'_, Session> {
        self.slots[id.index()].lock()
    }

    /// Drain both sessions, returning how many entries each released.
    pub fn drain_all(&self) -> [usize; SESSION_COUNT] {
        [
            self.lock(SessionId::FIRST).drain_all(),
            self.lock(SessionId::SECOND).drain_all(),
        ]
    }
}
