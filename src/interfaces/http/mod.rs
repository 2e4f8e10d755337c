//! HTTP trigger surface for the batch coordinator.

pub mod auth;
pub mod handlers;
pub mod server;
