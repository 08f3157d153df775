//! Scheduler layer
//!
//! Drives a build from submission through polling to the point where its
//! result can be fetched.

pub mod poller;

pub use poller::{JobPoller, PollResolution};
