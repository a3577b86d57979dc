//! Local validation errors.
//!
//! Everything in this module is detected before any RPC is attempted; none of
//! these inputs is ever sent to the remote service.

use thiserror::Error;

use crate::ids::IdError;
use crate::kind::ResourceKind;

/// A result type using `ValidationError`.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// A desired-state input that failed local validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A TTL or other duration string could not be parsed.
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration {
        /// The rejected input.
        input: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A tag does not follow the `tag:<value>` scheme.
    #[error("tag {0:?} must follow scheme of `tag:<value>`")]
    InvalidTag(String),

    /// A route does not follow the `net/mask` scheme.
    #[error("route {0:?} must follow scheme of `net/mask`")]
    InvalidRoute(String),

    /// An import identifier could not be parsed for the given kind.
    #[error("invalid import identifier for {kind}: {source}")]
    InvalidImportId {
        /// The kind being imported.
        kind: ResourceKind,
        /// The underlying parse failure.
        #[source]
        source: IdError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_input() {
        let err = ValidationError::InvalidTag("admin".into());
        assert_eq!(
            err.to_string(),
            "tag \"admin\" must follow scheme of `tag:<value>`"
        );

        let err = ValidationError::InvalidImportId {
            kind: ResourceKind::PreAuthKey,
            source: IdError::InvalidComposite {
                input: "bad".into(),
                expected: "user_id,key_id",
            },
        };
        assert!(err.to_string().starts_with("invalid import identifier for pre_auth_key"));
    }
}
