//! Provider-id handling.
//!
//! Nodes and Machines are joined on a *normalized* provider-id: everything after the final `/`
//! of `spec.providerID`. Infrastructure providers disagree on how many slashes precede the
//! instance identifier (`aws:///us-east-1a/i-0123`, `openstack:///abc`), so only the trailing
//! segment is comparable.

use crate::ObjectKey;

/// Prefix of the synthetic provider-id assigned to Machines that failed before a Node appeared.
pub const FAILED_MACHINE_PREFIX: &str = "failed-machine-";

/// Separates namespace and name in a failed-machine provider-id. Kubernetes namespaces are DNS
/// labels and cannot contain `_`, so the first `_` is always the separator.
const FAILED_MACHINE_SEPARATOR: char = '_';

/// Returns the normalized form of a provider-id.
pub fn normalize(provider_id: &str) -> &str {
    match provider_id.rfind('/') {
        Some(idx) => &provider_id[idx + 1..],
        None => provider_id,
    }
}

/// Builds the synthetic provider-id for a failed Machine.
pub fn failed_machine_id(key: &ObjectKey) -> String {
    format!(
        "{}{}{}{}",
        FAILED_MACHINE_PREFIX, key.namespace, FAILED_MACHINE_SEPARATOR, key.name
    )
}

/// Recovers the Machine key from a synthetic failed-machine provider-id.
pub fn parse_failed_machine_id(provider_id: &str) -> Option<ObjectKey> {
    let rest = provider_id.strip_prefix(FAILED_MACHINE_PREFIX)?;
    let (namespace, name) = rest.split_once(FAILED_MACHINE_SEPARATOR)?;
    if namespace.is_empty() || name.is_empty() {
        return None;
    }
    Some(ObjectKey::new(namespace, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes() {
        assert_eq!(normalize("aws:///us-east-1a/i-0123"), "i-0123");
        assert_eq!(normalize("openstack:///abc"), "abc");
        assert_eq!(normalize("i-0123"), "i-0123");
        assert_eq!(normalize("docker:////"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn failed_machine_ids() {
        let key = ObjectKey::new("default", "m-x");
        let id = failed_machine_id(&key);
        assert_eq!(id, "failed-machine-default_m-x");
        assert_eq!(normalize(&id), id);
        assert_eq!(parse_failed_machine_id(&id), Some(key));

        // Only the first separator splits the key.
        assert_eq!(
            parse_failed_machine_id("failed-machine-ns_a_b"),
            Some(ObjectKey::new("ns", "a_b"))
        );
        assert_eq!(parse_failed_machine_id("failed-machine-ns"), None);
        assert_eq!(parse_failed_machine_id("failed-machine-_m"), None);
        assert_eq!(parse_failed_machine_id("aws:///i-0123"), None);
    }
}
