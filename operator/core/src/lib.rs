#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod values;

pub use self::values::{get_path, merge, set_path, set_path_if_unset};

/// Field manager identity used for status writes issued by the operator.
pub const OPERATOR_NAME: &str = "operator.trellis.io";
