//! Network layer: the TCP gateway and per-session connection tasks.

pub mod connection;
pub mod gateway;

pub use connection::SessionConnection;
pub use gateway::Gateway;
