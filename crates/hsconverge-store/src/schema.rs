//! Database schema definitions and column families.
//!
//! Each resource kind gets its own column family, keyed by the local name.

use hsconverge_core::ResourceKind;

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// User records.
    pub const USERS: &str = "users";

    /// Pre-authentication key records.
    pub const PRE_AUTH_KEYS: &str = "pre_auth_keys";

    /// API key records.
    pub const API_KEYS: &str = "api_keys";

    /// Node tag set records.
    pub const NODE_TAGS: &str = "node_tags";

    /// Node route set records.
    pub const NODE_ROUTES: &str = "node_routes";
}

/// The column family holding records of `kind`.
#[must_use]
pub const fn cf_for(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::User => cf::USERS,
        ResourceKind::PreAuthKey => cf::PRE_AUTH_KEYS,
        ResourceKind::ApiKey => cf::API_KEYS,
        ResourceKind::NodeTags => cf::NODE_TAGS,
        ResourceKind::NodeRoutes => cf::NODE_ROUTES,
    }
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    ResourceKind::ALL.into_iter().map(cf_for).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_family_per_kind() {
        let families = all_column_families();
        assert_eq!(families.len(), ResourceKind::ALL.len());

        let mut deduped = families.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), families.len());
    }
}
