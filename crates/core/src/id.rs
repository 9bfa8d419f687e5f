// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed record identifiers.
//!
//! An id is a 4-byte type tag followed by a random token, stored inline so
//! records stay `Copy` and cheap to hash. The [`id_type!`] macro stamps out
//! one newtype per record kind.

/// Inline id storage, tag included. Shorter ids are NUL-padded.
pub const ID_CAPACITY: usize = 24;

/// Returns a prefix of `s` at most `n` bytes long, never splitting a
/// character.
pub fn short(s: &str, n: usize) -> &str {
    if s.len() <= n {
        return s;
    }
    let mut end = n;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// NUL-padded inline id bytes.
///
/// Padding keeps the derived `Eq`/`Ord` consistent with `str` comparison of
/// the active part (ids are ASCII and never contain NUL), so only `Hash`
/// needs care: it must hash exactly the active bytes to satisfy the
/// `Borrow<str>` contract for map lookups by string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RawId([u8; ID_CAPACITY]);

impl RawId {
    pub const fn nil() -> Self {
        Self([0; ID_CAPACITY])
    }

    /// Store an existing id string. Oversized input is debug-asserted and
    /// truncated at a char boundary in release builds.
    pub fn parse(s: &str) -> Self {
        debug_assert!(
            s.len() <= ID_CAPACITY,
            "id longer than {ID_CAPACITY} bytes: {s:?}",
        );
        let kept = short(s, ID_CAPACITY);
        let mut bytes = [0u8; ID_CAPACITY];
        bytes[..kept.len()].copy_from_slice(kept.as_bytes());
        Self(bytes)
    }

    /// Tag plus token, freshly generated.
    pub fn generate(tag: &str) -> Self {
        let mut bytes = [0u8; ID_CAPACITY];
        bytes[..tag.len()].copy_from_slice(tag.as_bytes());
        let token = nanoid::nanoid!((ID_CAPACITY - tag.len()));
        bytes[tag.len()..].copy_from_slice(token.as_bytes());
        Self(bytes)
    }

    fn active(&self) -> &[u8] {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(ID_CAPACITY);
        &self.0[..end]
    }

    pub fn as_str(&self) -> &str {
        // Only ever constructed from &str input; the fallback is unreachable.
        std::str::from_utf8(self.active()).unwrap_or("")
    }

    pub fn is_nil(&self) -> bool {
        self.0[0] == 0
    }
}

impl std::hash::Hash for RawId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Active bytes only, matching str::hash for Borrow<str> lookups.
        self.as_str().hash(state);
    }
}

impl std::borrow::Borrow<str> for RawId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Debug for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl std::fmt::Display for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for RawId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for RawId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct RawIdVisitor;

        impl serde::de::Visitor<'_> for RawIdVisitor {
            type Value = RawId;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "an id string of at most {ID_CAPACITY} bytes")
            }

            // Accepts borrowed and owned strings alike, so ids deserialize
            // from readers as well as from buffered input.
            fn visit_str<E>(self, value: &str) -> Result<RawId, E>
            where
                E: serde::de::Error,
            {
                if value.len() > ID_CAPACITY {
                    return Err(E::invalid_length(value.len(), &self));
                }
                Ok(RawId::parse(value))
            }
        }

        deserializer.deserialize_str(RawIdVisitor)
    }
}

/// Define a record id newtype over [`RawId`].
///
/// The tag is a 4-character type indicator baked into every generated id;
/// the remaining capacity is filled with a random token, so generated ids
/// are always exactly [`ID_CAPACITY`] characters. Parsed ids may be shorter.
///
/// Generated surface: `TAG`, `new()`, `from_string()`, `as_str()`,
/// `short()`, `Display`, `From<&str>`, `From<String>`, `AsRef<str>`, and
/// `Borrow<str>` for keying maps by plain strings.
///
/// ```ignore
/// id_type! {
///     /// Doc comment for the id type.
///     pub struct SandboxId("sbx-");
/// }
/// ```
#[macro_export]
macro_rules! id_type {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($tag:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name($crate::id::RawId);

        impl $name {
            pub const TAG: &'static str = $tag;

            /// A fresh random id carrying the type tag.
            pub fn new() -> Self {
                Self($crate::id::RawId::generate(Self::TAG))
            }

            /// Wrap an id string received from storage or the wire.
            pub fn from_string(id: impl AsRef<str>) -> Self {
                Self($crate::id::RawId::parse(id.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Up to `n` characters of the token (tag stripped), for names
            /// and log lines.
            pub fn short(&self, n: usize) -> &str {
                let full = self.0.as_str();
                let token = full.get(Self::TAG.len()..).unwrap_or(full);
                $crate::id::short(token, n)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from_string(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }
    };
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
