//! HTTP surface: axum router, request handlers, and error mapping.

pub mod handler;
