//! Data Transfer Objects
//!
//! Wire-neutral shapes exchanged between the transport and the decoders.

pub mod response;
