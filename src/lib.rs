//! RbVault - A dual-instance ordered key-value store driven by scripts
//!
//! This library provides:
//! - A balanced (red-black) ordered map from `i32` keys to 4-byte payloads
//! - A fixed 12-byte packet protocol for writes and read results
//! - Store sessions with min/max extraction modes
//! - A script interpreter and a coordinator running two scripts in parallel

pub mod config;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod sched;
pub mod script;
pub mod session;
pub mod store;
pub mod tree;

pub use config::{RunConfig, SchedulingConfig};
pub use coordinator::{Coordinator, RunReport, ScriptJob};
pub use error::{RbVaultError, Result};
pub use protocol::{decode, encode, Packet, PACKET_LEN};
pub use script::{parse_line, AbortSignal, Interpreter, Outcome, ScriptCommand, ScriptWorker, WorkerReport};
pub use session::{Device, Session, SessionId, Sessions};
pub use store::{Entry, ExtractionMode, OrderedStore, Payload};
