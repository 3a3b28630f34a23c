//! # Data Retrieval Module
//!
//! Generic HTTP plumbing shared by the network backends.
//!
//! - **`ky_http`**: an `ApiClient` built on `reqwest` and `reqwest-middleware`,
//!   with automatic retries (exponential backoff), a request timeout and
//!   standardized response handling. The PostgREST backend is built on it.

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;
