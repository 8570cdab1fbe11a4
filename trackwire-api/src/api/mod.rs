//! HTTP API handlers

pub mod auth;
pub mod codes;
pub mod distribution;
pub mod health;
pub mod payments;
