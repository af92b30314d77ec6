//! The web module for handling the Axum API.
//! This file declares the other files in this directory as sub-modules.

pub mod access_gate;
pub mod api;
pub mod auth;
pub mod models;
pub mod notifier;
pub mod result_cache;
pub mod revocation_filter;
pub mod task_store;
pub mod tasks;
pub mod token_id;
pub mod ws;
