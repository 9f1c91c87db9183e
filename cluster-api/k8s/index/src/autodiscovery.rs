//! Node-group auto-discovery specs.
//!
//! Each spec has the form `clusterapi:k1=v1,k2=v2,...`. The `clusterName` and `namespace` keys
//! restrict the cluster and namespace of admitted resources; every other pair is a label
//! equality requirement. A resource is admitted when any configured spec matches it, and an empty
//! configuration admits every resource.

use capi_autoscaler_provider_k8s_api::{Scalable, Selector};
use regex::Regex;
use std::{collections::BTreeMap, fmt, str::FromStr, sync::LazyLock};

const PROVIDER: &str = "clusterapi";
const CLUSTER_NAME_KEY: &str = "clusterName";
const NAMESPACE_KEY: &str = "namespace";

static LABEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?)?$")
        .expect("label name regex must compile")
});

static DNS_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("dns subdomain regex must compile")
});

/// The set of configured specs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutoDiscovery(Vec<DiscoverySpec>);

/// A single `clusterapi:...` spec.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoverySpec {
    pub cluster_name: Option<String>,
    pub namespace: Option<String>,
    labels: BTreeMap<String, String>,
    selector: Selector,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("spec {0:?} must have the form clusterapi:key=value[,key=value...]")]
    Malformed(String),

    #[error("unsupported discovery provider {0:?}")]
    UnsupportedProvider(String),

    #[error("invalid argument {0:?}: expected key=value")]
    InvalidArgument(String),

    #[error("invalid label key {0:?}")]
    InvalidLabelKey(String),

    #[error("invalid value {value:?} for label {key:?}")]
    InvalidLabelValue { key: String, value: String },
}

// === impl AutoDiscovery ===

impl AutoDiscovery {
    pub fn parse<S: AsRef<str>>(specs: impl IntoIterator<Item = S>) -> Result<Self, ParseError> {
        specs
            .into_iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn specs(&self) -> &[DiscoverySpec] {
        &self.0
    }

    /// Whether the resource is selected by any spec.
    pub fn admits(&self, resource: &Scalable) -> bool {
        self.0.is_empty() || self.0.iter().any(|spec| spec.matches(resource))
    }
}

impl FromIterator<DiscoverySpec> for AutoDiscovery {
    fn from_iter<T: IntoIterator<Item = DiscoverySpec>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// === impl DiscoverySpec ===

impl DiscoverySpec {
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn matches(&self, resource: &Scalable) -> bool {
        if let Some(ns) = self.namespace.as_deref() {
            if resource.namespace() != ns {
                return false;
            }
        }

        if let Some(name) = self.cluster_name.as_deref() {
            if resource.cluster_name() != Some(name) {
                return false;
            }
        }

        self.selector.matches(&resource.labels())
    }
}

impl FromStr for DiscoverySpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (provider, args) = match (parts.next(), parts.next(), parts.next()) {
            (Some(provider), Some(args), None) => (provider, args),
            _ => return Err(ParseError::Malformed(s.to_string())),
        };
        if provider != PROVIDER {
            return Err(ParseError::UnsupportedProvider(provider.to_string()));
        }

        let mut spec = DiscoverySpec::default();
        for arg in args.split(',') {
            let mut kv = arg.split('=');
            let (key, value) = match (kv.next(), kv.next(), kv.next()) {
                (Some(key), Some(value), None) if !key.is_empty() => (key, value),
                _ => return Err(ParseError::InvalidArgument(arg.to_string())),
            };

            match key {
                CLUSTER_NAME_KEY => spec.cluster_name = Some(value.to_string()),
                NAMESPACE_KEY => spec.namespace = Some(value.to_string()),
                _ => {
                    validate_label(key, value)?;
                    spec.labels.insert(key.to_string(), value.to_string());
                }
            }
        }

        spec.selector = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(spec)
    }
}

/// Renders the canonical form of a spec, which parses back to an equal spec.
impl fmt::Display for DiscoverySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PROVIDER}:")?;
        let mut sep = "";
        if let Some(name) = &self.cluster_name {
            write!(f, "{sep}{CLUSTER_NAME_KEY}={name}")?;
            sep = ",";
        }
        if let Some(ns) = &self.namespace {
            write!(f, "{sep}{NAMESPACE_KEY}={ns}")?;
            sep = ",";
        }
        for (k, v) in &self.labels {
            write!(f, "{sep}{k}={v}")?;
            sep = ",";
        }
        Ok(())
    }
}

fn validate_label(key: &str, value: &str) -> Result<(), ParseError> {
    let name = match key.split_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() || prefix.len() > 253 || !DNS_SUBDOMAIN.is_match(prefix) {
                return Err(ParseError::InvalidLabelKey(key.to_string()));
            }
            name
        }
        None => key,
    };
    if name.is_empty() || name.len() > 63 || !LABEL_NAME.is_match(name) {
        return Err(ParseError::InvalidLabelKey(key.to_string()));
    }

    // Values may be empty: `key=` requires the label to be present with an empty value.
    if value.len() > 63 || !LABEL_NAME.is_match(value) {
        return Err(ParseError::InvalidLabelValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}
