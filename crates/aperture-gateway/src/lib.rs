//! Realtime chat gateway: connection lifecycle, room registry and fan-out.

pub mod connection;
pub mod dispatcher;
pub mod registry;
pub mod router;
