//! Server runtime state: the shared context and per-session plumbing.

pub mod runtime;
pub mod session;

pub use runtime::ServerRuntimeContext;
pub use session::{SessionContext, SessionRegistry, StanzaWriter, WriteError};
