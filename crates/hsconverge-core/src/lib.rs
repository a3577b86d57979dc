//! Core types and utilities for hsconverge.
//!
//! This crate provides the foundational types shared by the store, RPC and
//! reconciliation crates:
//!
//! - **Identifiers**: Strongly-typed ids for users, nodes and keys
//! - **Resource addressing**: The closed set of kinds and `kind.name` addresses
//! - **Validation**: Duration, tag and route checks run before any RPC
//! - **Clock**: Injectable time source used for key expiry
//!
//! # Example
//!
//! ```
//! use hsconverge_core::{parse_duration, validate_tag, PreAuthKeyRef, UserId};
//!
//! let user: UserId = "42".parse().unwrap();
//! assert_eq!(user.get(), 42);
//!
//! let key: PreAuthKeyRef = "3,9".parse().unwrap();
//! assert_eq!(key.user_id, UserId::new(3));
//!
//! assert_eq!(parse_duration("90m").unwrap(), chrono::TimeDelta::minutes(90));
//! assert!(validate_tag("admin").is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod duration;
pub mod error;
pub mod ids;
pub mod kind;
pub mod secret;
pub mod validate;

#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use duration::parse_duration;
pub use error::{Result, ValidationError};
pub use ids::{ApiKeyPrefix, IdError, NodeId, PreAuthKeyId, PreAuthKeyRef, UserId};
pub use kind::{ResourceAddress, ResourceKind, UnknownKind};
pub use secret::Secret;
pub use validate::{validate_route, validate_routes, validate_tag, validate_tags};
