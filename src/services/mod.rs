//! Storage services: the preview store and the object-storage backends it
//! runs on.

pub mod backend;
pub mod bootstrap;
#[cfg(test)]
pub mod memory_backend;
pub mod preview_store;
pub mod s3_backend;
