//! Core identifier types for hsconverge.
//!
//! Every identifier here is assigned by the remote coordination service. The
//! local side only parses, stores and echoes them back; it never mints one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw numeric identifier.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Return the raw numeric identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_u64(s).map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Numeric user identifier.
    UserId
);

numeric_id!(
    /// Numeric node identifier.
    ///
    /// Node tag sets and route sets are keyed by the node they decorate, so
    /// this doubles as their resource id.
    NodeId
);

numeric_id!(
    /// Numeric pre-authentication key identifier, unique per service.
    PreAuthKeyId
);

/// The non-secret prefix of an API key.
///
/// The service indexes API keys by this prefix rather than by a numeric id,
/// so it is the only stable handle for later lookups.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyPrefix(String);

impl ApiKeyPrefix {
    /// Wrap an already-extracted prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    /// Derive the prefix from a full API key secret.
    ///
    /// The prefix is everything before the first `.`; a secret without a dot
    /// is its own prefix.
    #[must_use]
    pub fn from_secret(secret: &str) -> Self {
        let prefix = secret.split('.').next().unwrap_or(secret);
        Self(prefix.to_string())
    }

    /// Return the prefix as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKeyPrefix({})", self.0)
    }
}

impl fmt::Display for ApiKeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite import identifier for a pre-authentication key: `user_id,key_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreAuthKeyRef {
    /// Owner of the key.
    pub user_id: UserId,
    /// The key itself.
    pub key_id: PreAuthKeyId,
}

impl FromStr for PreAuthKeyRef {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        match parts.as_slice() {
            [user, key] if !user.is_empty() && !key.is_empty() => Ok(Self {
                user_id: user.parse()?,
                key_id: key.parse()?,
            }),
            _ => Err(IdError::InvalidComposite {
                input: s.to_string(),
                expected: "user_id,key_id",
            }),
        }
    }
}

impl fmt::Display for PreAuthKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.user_id, self.key_id)
    }
}

fn parse_u64(s: &str) -> Result<u64, IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    s.parse().map_err(|_| IdError::InvalidNumber {
        input: s.to_string(),
    })
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier was empty.
    #[error("identifier is empty")]
    Empty,

    /// The identifier is not an unsigned integer.
    #[error("invalid numeric identifier: {input:?}")]
    InvalidNumber {
        /// The rejected input.
        input: String,
    },

    /// A composite identifier did not have the expected shape.
    #[error("expected import identifier with format {expected}, got {input:?}")]
    InvalidComposite {
        /// The rejected input.
        input: String,
        /// Human-readable description of the expected format.
        expected: &'static str,
    },
}
