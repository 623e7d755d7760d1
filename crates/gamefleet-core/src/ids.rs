//! Core identifier types for gamefleet.
//!
//! Instance identifiers are opaque strings assigned by the provisioning
//! backend at creation time (for the Kubernetes backend, the pod name).

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque identifier for one managed game server instance.
///
/// The identifier is assigned by the `Provisioner` when the instance is
/// created and never changes afterwards. It is treated as an opaque token
/// everywhere outside the provisioning backend.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create a new `InstanceId` from the provisioner-assigned token.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_display() {
        let id = InstanceId::new("gs-0123abcd");
        assert_eq!(id.to_string(), "gs-0123abcd");
        assert_eq!(id.as_str(), "gs-0123abcd");
    }

    #[test]
    fn instance_id_equality() {
        let a = InstanceId::new("gs-a");
        let b = InstanceId::from("gs-a");
        let c = InstanceId::from("gs-c".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn instance_id_serde_json() {
        let id = InstanceId::new("gs-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"gs-42\"");
        let parsed: InstanceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
