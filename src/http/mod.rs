//! HTTP module for URL warmup tasks
//!
//! Provides the transport capability the runner sends warmup requests through.

mod client;

pub use client::{HttpClient, HttpError, HttpRequest, HttpResponse, HttpTransport};
