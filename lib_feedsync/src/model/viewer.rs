use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the signed-in member, as handed over by the auth collaborator.
///
/// The value is opaque to this crate: it is compared and sent to the backend,
/// never parsed. "No signed-in viewer" is expressed as `Option<ViewerId>::None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(String);

impl ViewerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ViewerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
