//! tenfold coaching backend library
//!
//! Core functionality for the tenfold AI business-coaching backend:
//! context assembly, vector memory, the recency cache, the multi-provider
//! generation gateway, realtime sessions, speech, and the HTTP server.

pub mod ai;
pub mod cache;
pub mod cli;
pub mod coach;
pub mod config;
pub mod memory;
pub mod migrations;
pub mod server;
pub mod sessions;
pub mod speech;
pub mod telemetry;
