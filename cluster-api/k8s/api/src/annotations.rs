//! Annotation keys read from and written to CAPI objects and workload Nodes.
//!
//! Every key exists under the current `cluster.x-k8s.io` prefix and a deprecated
//! `cluster.k8s.io` prefix. Readers accept both and prefer the current key; writers set both.

use crate::duration;
use std::{collections::BTreeMap, time::Duration};

pub const MIN_SIZE: &str = "cluster.x-k8s.io/cluster-api-autoscaler-node-group-min-size";
pub const MIN_SIZE_DEPRECATED: &str = "cluster.k8s.io/cluster-api-autoscaler-node-group-min-size";
pub const MAX_SIZE: &str = "cluster.x-k8s.io/cluster-api-autoscaler-node-group-max-size";
pub const MAX_SIZE_DEPRECATED: &str = "cluster.k8s.io/cluster-api-autoscaler-node-group-max-size";

pub const DELETE_MACHINE: &str = "cluster.x-k8s.io/delete-machine";
pub const DELETE_MACHINE_DEPRECATED: &str = "cluster.k8s.io/delete-machine";

/// Set on workload Nodes; locates the owning Machine as `namespace/name`.
pub const NODE_MACHINE: &str = "cluster.x-k8s.io/machine";
pub const NODE_MACHINE_DEPRECATED: &str = "cluster.k8s.io/machine";

pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";
pub const CLUSTER_NAME_LABEL_DEPRECATED: &str = "cluster.k8s.io/cluster-name";

pub const SCALE_DOWN_UTILIZATION_THRESHOLD: &str =
    "cluster.x-k8s.io/autoscaling-options-scaledownutilizationthreshold";
pub const SCALE_DOWN_GPU_UTILIZATION_THRESHOLD: &str =
    "cluster.x-k8s.io/autoscaling-options-scaledowngpuutilizationthreshold";
pub const SCALE_DOWN_UNNEEDED_TIME: &str =
    "cluster.x-k8s.io/autoscaling-options-scaledownunneededtime";
pub const SCALE_DOWN_UNREADY_TIME: &str =
    "cluster.x-k8s.io/autoscaling-options-scaledownunreadytime";
pub const MAX_NODE_PROVISION_TIME: &str =
    "cluster.x-k8s.io/autoscaling-options-maxnodeprovisiontime";

pub type Annotations = BTreeMap<String, String>;

/// Scaling bounds parsed from a scalable resource's annotations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub min: i32,
    pub max: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BoundsError {
    #[error("invalid value for {key}: {value:?}")]
    NotAnInteger { key: &'static str, value: String },

    #[error("{key} must not be negative: {value}")]
    Negative { key: &'static str, value: i32 },

    #[error("max size ({max}) must be greater than or equal to min size ({min})")]
    MaxBelowMin { min: i32, max: i32 },
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum OptionError {
    #[error("invalid value for {key}: {value:?}")]
    NotAFloat { key: &'static str, value: String },

    #[error("invalid value for {key}: {source}")]
    Duration {
        key: &'static str,
        #[source]
        source: duration::ParseError,
    },
}

/// Looks up a key, preferring the current name over its deprecated twin.
pub fn get<'a>(
    annotations: &'a Annotations,
    current: &'static str,
    deprecated: &'static str,
) -> Option<(&'static str, &'a str)> {
    annotations
        .get(current)
        .map(|v| (current, v.as_str()))
        .or_else(|| annotations.get(deprecated).map(|v| (deprecated, v.as_str())))
}

pub fn has_bounds(annotations: &Annotations) -> bool {
    get(annotations, MIN_SIZE, MIN_SIZE_DEPRECATED).is_some()
        && get(annotations, MAX_SIZE, MAX_SIZE_DEPRECATED).is_some()
}

/// Parses the scaling bounds of a scalable resource.
///
/// Returns `Ok(None)` when either bound is unset. A `max` of zero is returned as-is; callers
/// treat it as autoscaling being disabled for the resource.
pub fn parse_bounds(annotations: &Annotations) -> Result<Option<Bounds>, BoundsError> {
    let min = match get(annotations, MIN_SIZE, MIN_SIZE_DEPRECATED) {
        Some((key, value)) => parse_size(key, value)?,
        None => return Ok(None),
    };
    let max = match get(annotations, MAX_SIZE, MAX_SIZE_DEPRECATED) {
        Some((key, value)) => parse_size(key, value)?,
        None => return Ok(None),
    };
    if max < min {
        return Err(BoundsError::MaxBelowMin { min, max });
    }
    Ok(Some(Bounds { min, max }))
}

fn parse_size(key: &'static str, value: &str) -> Result<i32, BoundsError> {
    let size = value
        .trim()
        .parse::<i32>()
        .map_err(|_| BoundsError::NotAnInteger {
            key,
            value: value.to_string(),
        })?;
    if size < 0 {
        return Err(BoundsError::Negative { key, value: size });
    }
    Ok(size)
}

/// Whether the Machine carries either delete marker.
pub fn is_marked_for_deletion(annotations: &Annotations) -> bool {
    annotations.contains_key(DELETE_MACHINE) || annotations.contains_key(DELETE_MACHINE_DEPRECATED)
}

/// Sets both delete markers, overwriting any prior value.
pub fn mark_for_deletion(annotations: &mut Annotations, timestamp: &str) {
    annotations.insert(DELETE_MACHINE.to_string(), timestamp.to_string());
    annotations.insert(DELETE_MACHINE_DEPRECATED.to_string(), timestamp.to_string());
}

/// Removes both delete markers. Returns true if anything was removed.
pub fn unmark_for_deletion(annotations: &mut Annotations) -> bool {
    let current = annotations.remove(DELETE_MACHINE).is_some();
    let deprecated = annotations.remove(DELETE_MACHINE_DEPRECATED).is_some();
    current || deprecated
}

/// The Machine locator recorded on a workload Node.
pub fn node_machine(annotations: &Annotations) -> Option<&str> {
    get(annotations, NODE_MACHINE, NODE_MACHINE_DEPRECATED).map(|(_, v)| v)
}

pub fn float_option(
    annotations: &Annotations,
    key: &'static str,
) -> Result<Option<f64>, OptionError> {
    annotations
        .get(key)
        .map(|value| {
            value.trim().parse::<f64>().map_err(|_| OptionError::NotAFloat {
                key,
                value: value.clone(),
            })
        })
        .transpose()
}

pub fn duration_option(
    annotations: &Annotations,
    key: &'static str,
) -> Result<Option<Duration>, OptionError> {
    annotations
        .get(key)
        .map(|value| {
            duration::parse(value.trim()).map_err(|source| OptionError::Duration { key, source })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn bounds_require_both_keys() {
        assert_eq!(parse_bounds(&Annotations::new()), Ok(None));
        assert_eq!(
            parse_bounds(&btreemap! { MIN_SIZE.to_string() => "1".to_string() }),
            Ok(None)
        );
        assert_eq!(
            parse_bounds(&btreemap! { MAX_SIZE.to_string() => "3".to_string() }),
            Ok(None)
        );
    }

    #[test]
    fn bounds_accept_deprecated_keys() {
        let annotations = btreemap! {
            MIN_SIZE_DEPRECATED.to_string() => "1".to_string(),
            MAX_SIZE_DEPRECATED.to_string() => "4".to_string(),
        };
        assert!(has_bounds(&annotations));
        assert_eq!(parse_bounds(&annotations), Ok(Some(Bounds { min: 1, max: 4 })));
    }

    #[test]
    fn current_bounds_win() {
        let annotations = btreemap! {
            MIN_SIZE.to_string() => "2".to_string(),
            MIN_SIZE_DEPRECATED.to_string() => "1".to_string(),
            MAX_SIZE.to_string() => "5".to_string(),
            MAX_SIZE_DEPRECATED.to_string() => "9".to_string(),
        };
        assert_eq!(parse_bounds(&annotations), Ok(Some(Bounds { min: 2, max: 5 })));
    }

    #[test]
    fn invalid_bounds() {
        let annotations = btreemap! {
            MIN_SIZE.to_string() => "3".to_string(),
            MAX_SIZE.to_string() => "2".to_string(),
        };
        assert_eq!(
            parse_bounds(&annotations),
            Err(BoundsError::MaxBelowMin { min: 3, max: 2 })
        );

        let annotations = btreemap! {
            MIN_SIZE.to_string() => "-1".to_string(),
            MAX_SIZE.to_string() => "2".to_string(),
        };
        assert_eq!(
            parse_bounds(&annotations),
            Err(BoundsError::Negative {
                key: MIN_SIZE,
                value: -1
            })
        );

        let annotations = btreemap! {
            MIN_SIZE.to_string() => "0".to_string(),
            MAX_SIZE.to_string() => "many".to_string(),
        };
        assert_eq!(
            parse_bounds(&annotations),
            Err(BoundsError::NotAnInteger {
                key: MAX_SIZE,
                value: "many".to_string()
            })
        );
    }

    #[test]
    fn delete_markers_round_trip() {
        let original = btreemap! { "keep".to_string() => "me".to_string() };
        let mut annotations = original.clone();
        mark_for_deletion(&mut annotations, "2024-01-01T00:00:00Z");
        assert!(is_marked_for_deletion(&annotations));
        assert_eq!(annotations[DELETE_MACHINE], "2024-01-01T00:00:00Z");
        assert_eq!(annotations[DELETE_MACHINE_DEPRECATED], "2024-01-01T00:00:00Z");

        assert!(unmark_for_deletion(&mut annotations));
        assert_eq!(annotations, original);
        assert!(!unmark_for_deletion(&mut annotations));
    }

    #[test]
    fn options() {
        let annotations = btreemap! {
            SCALE_DOWN_UTILIZATION_THRESHOLD.to_string() => "0.6".to_string(),
            SCALE_DOWN_UNNEEDED_TIME.to_string() => "5m".to_string(),
            MAX_NODE_PROVISION_TIME.to_string() => "soon".to_string(),
        };
        assert_eq!(
            float_option(&annotations, SCALE_DOWN_UTILIZATION_THRESHOLD),
            Ok(Some(0.6))
        );
        assert_eq!(
            float_option(&annotations, SCALE_DOWN_GPU_UTILIZATION_THRESHOLD),
            Ok(None)
        );
        assert_eq!(
            duration_option(&annotations, SCALE_DOWN_UNNEEDED_TIME),
            Ok(Some(Duration::from_secs(300)))
        );
        assert!(duration_option(&annotations, MAX_NODE_PROVISION_TIME).is_err());
    }
}
