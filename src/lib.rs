//! Task manager backend with session revocation, list caching and live
//! change notification.

pub mod config;
pub mod web;
