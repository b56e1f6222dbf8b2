//! Dumphub - dumper task dashboard backend
//!
//! This library provides the core functionality for the dumphub service:
//! license-gated accounts, signed session tokens, dumper task and machine
//! management, and dump file storage with signed downloads.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
