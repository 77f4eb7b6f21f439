//! Centralized error handling for the Stalker relay
//!
//! Every layer returns [`AppError`]. The portal client classifies upstream
//! failures into the categories the orchestrator and the retry executor act
//! on:
//!
//! - **Configuration**: invalid profile settings, fatal before a profile starts
//! - **Protocol**: the portal answered with an unexpected envelope, never retried
//! - **Invalid credentials**: the portal rejected the identity, terminal
//! - **Transient network**: connect/timeout/5xx failures, retried at startup
//! - **Empty catalog**: the account returned no channels, terminal
//!
//! # Usage
//!
//! ```rust
//! use stalker_relay::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::configuration("empty portal url"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
