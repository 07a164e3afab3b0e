//! RTH Admin Backend Library
//!
//! Administrator authentication and session lifecycle for the RTH Bandung
//! dashboard. Exposes every module so the binary and integration tests share
//! one router.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod middleware;
pub mod retry;
