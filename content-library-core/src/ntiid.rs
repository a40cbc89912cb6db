//! The identifier shared by content units, packages and bundles.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A stable, opaque identifier. Two objects with the same NTIID within one
/// library layer are the same object (possibly changed), never two objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ntiid(String);

impl Ntiid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ntiid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Ntiid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Ntiid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Ntiid {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Ntiid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<str> for Ntiid {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Ntiid {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
