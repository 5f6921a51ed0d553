//! Turns a stream of resource changes into debounced, rate-limited scan
//! dispatches to every registered target.
//!
//! ```text
//! [ Observer ] -> Debouncer::add -> [ timer ] -> Registry snapshot -> [ ScanClient ] per (target, key)
//! ```

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod debounce;
mod flush;
pub mod metrics;
pub mod registry;


pub use self::{
    debounce::{Config, Debouncer},
    metrics::Metrics,
    registry::{Handle, Registry, Target, Targets},
};
