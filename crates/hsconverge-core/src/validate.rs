//! Pattern checks for tag and route values.
//!
//! Patterns are matched against the whole value, so `"xtag:a"` is not a tag
//! and `"10.0.0.0"` (no mask) is not a route.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, ValidationError};

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tag:[\w-]+$").expect("tag pattern is valid"));

static ROUTE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+/.+$").expect("route pattern is valid"));

/// Check a single ACL tag.
///
/// # Errors
///
/// Returns `ValidationError::InvalidTag` if the value is not `tag:<value>`.
pub fn validate_tag(tag: &str) -> Result<()> {
    if TAG_PATTERN.is_match(tag) {
        Ok(())
    } else {
        Err(ValidationError::InvalidTag(tag.to_string()))
    }
}

/// Check a single approved route.
///
/// # Errors
///
/// Returns `ValidationError::InvalidRoute` if the value is not `net/mask`.
pub fn validate_route(route: &str) -> Result<()> {
    if ROUTE_PATTERN.is_match(route) {
        Ok(())
    } else {
        Err(ValidationError::InvalidRoute(route.to_string()))
    }
}

/// Check every tag in a collection, failing on the first bad one.
///
/// # Errors
///
/// Returns the first `ValidationError::InvalidTag` encountered.
pub fn validate_tags<'a>(tags: impl IntoIterator<Item = &'a String>) -> Result<()> {
    tags.into_iter().try_for_each(|tag| validate_tag(tag))
}

/// Check every route in a collection, failing on the first bad one.
///
/// # Errors
///
/// Returns the first `ValidationError::InvalidRoute` encountered.
pub fn validate_routes<'a>(routes: impl IntoIterator<Item = &'a String>) -> Result<()> {
    routes.into_iter().try_for_each(|route| validate_route(route))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags() {
        assert!(validate_tag("tag:prod").is_ok());
        assert!(validate_tag("tag:web-01").is_ok());
        assert!(validate_tag("tag:snake_case").is_ok());

        assert_eq!(
            validate_tag("admin"),
            Err(ValidationError::InvalidTag("admin".into()))
        );
        assert!(validate_tag("tag:").is_err());
        assert!(validate_tag("xtag:prod").is_err());
        assert!(validate_tag("tag:has space").is_err());
    }

    #[test]
    fn routes() {
        assert!(validate_route("10.0.0.0/8").is_ok());
        assert!(validate_route("192.168.0.0/24").is_ok());
        assert!(validate_route("fd7a:115c:a1e0::/48").is_ok());

        assert_eq!(
            validate_route("10.0.0.0"),
            Err(ValidationError::InvalidRoute("10.0.0.0".into()))
        );
        assert!(validate_route("/8").is_err());
        assert!(validate_route("10.0.0.0/").is_err());
    }

    #[test]
    fn collections_stop_at_first_failure() {
        let tags = vec!["tag:a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(
            validate_tags(&tags),
            Err(ValidationError::InvalidTag("b".into()))
        );
    }
}
