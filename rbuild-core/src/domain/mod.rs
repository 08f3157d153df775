//! Core domain types
//!
//! The structures a build job moves through: the request that is submitted,
//! the handle returned for polling, the outcome of each poll, and the manifest
//! that describes the finished job's artifacts.

pub mod job;
pub mod manifest;
pub mod request;
pub mod system;
