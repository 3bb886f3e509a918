//! Data models for the preview service.
//!
//! A `Preview` is addressed by its logical identity and, once stored, carries
//! `Metadata` derived from the backend. Both serialize naturally as JSON via
//! `serde` where they cross the HTTP boundary.

pub mod metadata;
pub mod preview;
