//! rbuild Core
//!
//! Core types and decoders for the remote build client.
//!
//! This crate contains:
//! - Domain types: build requests, job handles, poll outcomes, result manifests
//! - DTOs: the wire-neutral response shape the decoders operate on
//! - Decoders: turning raw service responses into typed outcomes
//!
//! Nothing in here performs I/O; transport lives in `rbuild-client`.

pub mod domain;
pub mod dto;
pub mod error;
pub mod status;

pub use error::DecodeError;
