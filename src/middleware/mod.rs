//! HTTP middleware shared by all routes.

pub mod logging;

pub use logging::{request_logging, RejectionReason};
