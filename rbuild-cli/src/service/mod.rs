//! Service layer
//!
//! Retrieval of finished builds: manifest decoding, artifact downloads and
//! delivery of captured output streams.

pub mod fetcher;

pub use fetcher::{FetchReport, ResultFetcher};
