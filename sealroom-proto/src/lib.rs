//! Shared protocol definitions for the `SealRoom` wire format.

pub mod codec;
pub mod event;
