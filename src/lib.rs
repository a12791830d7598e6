//! medigate - edge gateway for a patient-record platform
//!
//! The gateway is the single inbound entry point for the platform. It:
//!
//! - **Bridges sessions**: translates the browser-held session cookie into
//!   an explicit `Authorization: Bearer <token>` header so downstream
//!   services never deal with cookies.
//! - **Mints tokens**: issues signed, time-limited identity tokens on
//!   login/register and expires the session cookie on logout.
//! - **Proxies**: relays method, allow-listed headers, and body to the
//!   backend bound to each path prefix, passing backend statuses through
//!   verbatim and mapping connectivity failures to 502.
//!
//! Everything else (patient CRUD, notes, risk scoring, the rendered UI)
//! lives in backend services reached over plain HTTP.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
