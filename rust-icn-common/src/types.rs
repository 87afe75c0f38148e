//! Small identifier types shared by every table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a face.
///
/// Network faces are assigned by the link layer. Application-side ids are
/// opaque to the forwarder and are handed back unchanged with the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceId(pub i32);

impl FaceId {
    /// Outgoing face recorded in the PIT while an Interest waits for the local application.
    pub const LOCAL_APP: FaceId = FaceId(-1);
}

impl From<i32> for FaceId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FaceId({})", self.0)
    }
}
