//! Client SDK for identifier-resolution services.
//!
//! The SDK keeps a capped population of long-lived TCP connections per
//! resolver endpoint and arbitrates access to them among concurrent
//! callers: [`transport::pool`] is the machinery, [`client`] the thin
//! surface most callers want.

pub mod client;
pub mod config;
pub mod transport;

pub use client::{Client, ClientFactory};
pub use config::Config;

/// Set up logging. Safe to call more than once; test friendly.
pub fn logger() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
