//! Upstream HTTP access: the metadata (Gamma) and order-book (CLOB) APIs.
//!
//! One shared [`UpstreamClient`] is built at startup and reused everywhere;
//! it owns the retry policy, the fetch semaphore bounding concurrent
//! requests, and the optional CLOB credentials.

pub mod auth;
pub mod client;
pub mod dto;
pub mod retry;

pub use auth::ClobAuth;
pub use client::UpstreamClient;
pub use retry::RetryPolicy;
