//! Glue between Kubernetes watches and the dispatch engine.
//!
//! An [`Observer`] runs per watched kind and feeds changes into the
//! debouncer. [`Integrations`] reconciles `ScanIntegration` resources into
//! registry entries.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod integrations;
mod observer;

pub use self::{
    integrations::{
        integration_key, target_spec, Integrations, SecretTokens, TokenError, TokenSource,
    },
    observer::Observer,
};
