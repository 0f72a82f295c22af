//! `SealRoom` relay server library.
//!
//! Exposes the relay server for use in tests and embedding. The relay
//! accepts WebSocket connections, tracks room membership, and fans
//! public keys and encrypted envelopes out to the other members of a room
//! without ever interpreting them.

pub mod config;
pub mod relay;
pub mod rooms;
