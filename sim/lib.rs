#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod bootstrap;
pub mod boundary;
pub mod config;
pub mod coverage;
pub mod interpolate;
pub mod io;
pub mod pipeline;
pub mod progress;
pub mod realization;
pub mod threshold;
pub mod types;

#[path = "../fields/mod.rs"]
pub mod fields;
