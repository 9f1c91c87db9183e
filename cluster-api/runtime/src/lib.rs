#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use capi_autoscaler_provider_core as core;
pub use capi_autoscaler_provider_k8s_api as k8s;
pub use capi_autoscaler_provider_k8s_index as index;
pub use capi_autoscaler_provider_k8s_nodegroup as nodegroup;

mod args;
mod status;

pub use self::args::Args;
