// Library root for the Palisade session guardrail

pub mod api;
pub mod config;
pub mod core;
pub mod engine;
pub mod infra;
pub mod state;
pub mod telemetry;

pub use api::{ProxyHooks, SessionBackend, SessionGuardrail};
pub use config::Config;
pub use core::errors::{BackendError, GuardrailError};
pub use state::ResponseDedup;
