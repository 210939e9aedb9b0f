//! String newtypes for the two names the relay routes by.
//!
//! [`Identity`] is supplied from outside (the identity resolver) and is never
//! generated here. [`ConnectionId`] is minted by the server for every accepted
//! connection as `conn_<uuid v7>`, so ids sort by accept time in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id! {
    /// Stable address of a client for signaling purposes (e.g. an email).
    ///
    /// Opaque to the relay: compared byte for byte, never normalized.
    Identity
}

string_id! {
    /// Server-assigned name of one live connection handle.
    ConnectionId
}

impl ConnectionId {
    /// Mint a fresh connection id (`conn_<uuid v7>`).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_has_prefix_and_v7_uuid() {
        let id = ConnectionId::new();
        let raw = id.as_str().strip_prefix("conn_").expect("conn_ prefix");
        let parsed = Uuid::parse_str(raw).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::default();
        assert_ne!(a, b);
    }

    #[test]
    fn identity_is_opaque() {
        let upper = Identity::from("Alice@X.com");
        let lower = Identity::from("alice@x.com");
        assert_ne!(upper, lower);
        assert_eq!(upper.as_str(), "Alice@X.com");
    }

    #[test]
    fn deref_and_display() {
        let id = Identity::from("bob@x.com");
        let s: &str = &id;
        assert_eq!(s, "bob@x.com");
        assert_eq!(format!("{id}"), "bob@x.com");
    }

    #[test]
    fn borrow_allows_str_lookup() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        let _ = map.insert(Identity::from("carol@x.com"), 1);
        assert_eq!(map.get("carol@x.com"), Some(&1));
    }

    #[test]
    fn serde_is_transparent() {
        let id = Identity::from("dave@x.com");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"dave@x.com\"");
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn into_inner_and_string() {
        let id = ConnectionId::from("conn_fixed");
        assert_eq!(id.clone().into_inner(), "conn_fixed");
        let s: String = id.into();
        assert_eq!(s, "conn_fixed");
    }
}
