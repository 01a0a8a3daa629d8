#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use trellis_operator_k8s_api as k8s;
pub use trellis_operator_revisions as revisions;
pub use trellis_operator_status as status;
pub use trellis_operator_values as values;

mod args;
mod fips;
mod lease;
mod metrics;
mod reconciler;

pub use self::args::Args;
