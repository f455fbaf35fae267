//! Remote API client, authentication and retry policy.
//!
//! This module provides the [`ApiClient`] used by remote extraction, along
//! with authentication types ([`Auth`], [`AuthType`]) and the
//! [`RetryPolicy`] that governs transient failures.

mod api;
mod auth;
mod retry;

pub use api::{ApiClient, EndpointProfile};
pub use auth::{Auth, AuthType};
pub use retry::RetryPolicy;
