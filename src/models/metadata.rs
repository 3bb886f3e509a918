//! Metadata describing the stored bytes of a preview.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend-derived description of a stored preview object.
///
/// Never built by hand outside the store: it comes either from a backend
/// HEAD/GET response or from the deposit that wrote the object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    /// Base64-encoded MD5 of the stored bytes. Served as the entity tag.
    pub checksum: String,

    /// When the object was written (backend last-modified time).
    pub added: DateTime<Utc>,

    /// Object length in bytes.
    pub size_bytes: i64,
}
