//! Branded ID newtypes.
//!
//! Callback registrations and event subscriptions are both keyed by strings on
//! the wire and in registries. Wrapping them keeps one from being passed where
//! the other is expected. Fresh IDs are UUID v7.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
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

        impl Default for $name {
            fn default() -> Self {
                Self::new()
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

branded_id! {
    /// Name under which a one-shot response callback is registered on an endpoint.
    CallbackName
}

branded_id! {
    /// Identifier of a frontend event subscription. Doubles as the notification
    /// method the frontend uses to deliver the event.
    SubscriptionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_name_is_uuid_v7() {
        let id = CallbackName::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn subscription_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..256).map(|_| SubscriptionId::new()).collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn deref_and_display_agree() {
        let id = SubscriptionId::from("plotly-click-1");
        let s: &str = &id;
        assert_eq!(s, "plotly-click-1");
        assert_eq!(format!("{id}"), "plotly-click-1");
    }

    #[test]
    fn into_string() {
        let id = CallbackName::from("cb");
        let s: String = id.into();
        assert_eq!(s, "cb");
    }

    #[test]
    fn serde_is_transparent() {
        let id = SubscriptionId::from("evt");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"evt\"");
        let back: SubscriptionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
