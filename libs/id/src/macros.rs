//! The `define_id!` macro and the parser it expands to.

use crate::{IdError, Ulid};

/// Splits `{prefix}_{ulid}` and checks the prefix. Shared by every id type
/// so they all reject malformed input the same way.
#[doc(hidden)]
pub fn parse_prefixed(raw: &str, prefix: &'static str) -> Result<Ulid, IdError> {
    if raw.is_empty() {
        return Err(IdError::Empty);
    }
    let (actual, ulid) = raw.split_once('_').ok_or(IdError::MissingSeparator)?;
    if actual != prefix {
        return Err(IdError::InvalidPrefix {
            expected: prefix,
            actual: actual.to_string(),
        });
    }
    ulid.parse().map_err(|e: ulid::DecodeError| IdError::InvalidUlid(e.to_string()))
}

/// Defines a ULID-backed id type rendered as `{prefix}_{ulid}`.
///
/// The generated type is `Copy`, ordered by creation time, and serializes as
/// its string form.
///
/// ```ignore
/// define_id!(
///     /// A live component instance.
///     ComponentId,
///     "cmp"
/// );
/// ```
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::Ulid);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// A fresh id.
            #[must_use]
            pub fn new() -> Self {
                Self($crate::Ulid::new())
            }

            /// Parses the `{prefix}_{ulid}` form, rejecting any other prefix.
            pub fn parse(raw: &str) -> Result<Self, $crate::IdError> {
                $crate::macros::parse_prefixed(raw, Self::PREFIX).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Self::parse(raw)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}
