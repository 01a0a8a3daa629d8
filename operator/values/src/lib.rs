#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Computes the final configuration values for a control-plane revision by
//! layering built-in profiles, vendor defaults, user values, and operator
//! overrides.

mod config;
mod overlay;
mod profiles;
mod schema;

pub use self::{
    config::{ConfigError, ImageDigests, OperatorConfig},
    overlay::{compute, Error},
    profiles::{resolve, ProfileError, DEFAULT_PROFILE},
    schema::MeshValues,
};
