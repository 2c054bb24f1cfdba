//! Core types for the updater
//!
//! This module holds the pieces every pipeline stage depends on:
//!
//! - [`UpdateError`] - the error taxonomy of the update pipeline
//! - [`ErrorContext`] - user-facing error wrapper with suggestions
//! - [`user_friendly_error`] - converts any [`anyhow::Error`] for display
//! - [`UpdateRequest`] - the validated `(install dir, download URL)` input
//!
//! # Error handling pattern
//!
//! ```rust
//! use inplace_updater::core::{UpdateError, user_friendly_error};
//! use anyhow::Result;
//!
//! fn download() -> Result<()> {
//!     Err(UpdateError::NetworkError {
//!         operation: "download".into(),
//!         reason: "HTTP 503".into(),
//!     }
//!     .into())
//! }
//!
//! if let Err(e) = download() {
//!     let friendly = user_friendly_error(e);
//!     assert!(friendly.suggestion.is_some());
//! }
//! ```

pub mod error;
pub mod request;

pub use error::{ErrorContext, UpdateError, create_error_context, user_friendly_error};
pub use request::UpdateRequest;
