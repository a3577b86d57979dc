//! Replace policy: which desired-state changes can be applied in place and
//! which force the resource to be recreated.

use hsconverge_store::{ApiKeyState, NodeAttributeState, PreAuthKeyState, UserState};

use crate::types::{ApiKeySpec, PreAuthKeySpec, UserSpec};

/// What it takes to move a resource from its prior state to the desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Already converged.
    NoChange,
    /// Mutable fields differ; update in place.
    Update {
        /// The differing fields.
        fields: Vec<&'static str>,
    },
    /// An immutable field differs; delete then create.
    Replace {
        /// The differing immutable fields.
        fields: Vec<&'static str>,
    },
}

impl Plan {
    fn from_diff(replace: Vec<&'static str>, update: Vec<&'static str>) -> Self {
        if !replace.is_empty() {
            Self::Replace { fields: replace }
        } else if !update.is_empty() {
            Self::Update { fields: update }
        } else {
            Self::NoChange
        }
    }
}

/// Empty strings mean "unset" on both sides.
fn normalized(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

/// Users: email and display name are fixed at creation; the name is renamed.
#[must_use]
pub fn user(prior: &UserState, desired: &UserSpec) -> Plan {
    let mut replace = Vec::new();
    if normalized(prior.email.as_ref()) != normalized(desired.email.as_ref()) {
        replace.push("email");
    }
    if normalized(prior.display_name.as_ref()) != normalized(desired.display_name.as_ref()) {
        replace.push("display_name");
    }

    let mut update = Vec::new();
    if prior.name != desired.name {
        update.push("name");
    }
    Plan::from_diff(replace, update)
}

/// Pre-auth keys: every input is fixed at creation.
#[must_use]
pub fn pre_auth_key(prior: &PreAuthKeyState, desired: &PreAuthKeySpec) -> Plan {
    let mut replace = Vec::new();
    if prior.user_id != desired.user_id {
        replace.push("user_id");
    }
    if prior.reusable != desired.reusable {
        replace.push("reusable");
    }
    if prior.ephemeral != desired.ephemeral {
        replace.push("ephemeral");
    }
    if prior.ttl != desired.ttl {
        replace.push("ttl");
    }
    if prior.acl_tags != desired.acl_tags {
        replace.push("acl_tags");
    }
    Plan::from_diff(replace, Vec::new())
}

/// API keys: the TTL is fixed at creation.
#[must_use]
pub fn api_key(prior: &ApiKeyState, desired: &ApiKeySpec) -> Plan {
    let replace = if prior.ttl == desired.ttl {
        Vec::new()
    } else {
        vec!["ttl"]
    };
    Plan::from_diff(replace, Vec::new())
}

/// Node attribute sets: the node is fixed; the values are replaced wholesale.
#[must_use]
pub fn node_attribute(
    prior: &NodeAttributeState,
    node_id: hsconverge_core::NodeId,
    values: &std::collections::BTreeSet<String>,
    values_field: &'static str,
) -> Plan {
    let replace = if prior.node_id == node_id {
        Vec::new()
    } else {
        vec!["node_id"]
    };
    let update = if &prior.values == values {
        Vec::new()
    } else {
        vec![values_field]
    };
    Plan::from_diff(replace, update)
}
