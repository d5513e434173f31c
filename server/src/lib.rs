//! Socket broker - authenticated real-time message relay.
//!
//! This crate accepts WebSocket connections from browser and non-browser
//! clients, admits them through an origin policy and an optional token
//! gate, and relays JSON events between them:
//! - Broadcasting `custom:event` payloads to every connection
//! - Tracking named rooms that connections join and leave
//! - Relaying `room:event` payloads to the members of one room
//!
//! # Architecture
//!
//! Connection tasks decode frames and forward commands to a single hub task
//! that owns the connection table and the room registry. Each connection
//! has a bounded outbound queue drained by its own writer, so one slow
//! client cannot stall the others. Nothing is persisted.

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod hub;
pub mod origin;
pub mod rooms;
pub mod routes;
pub mod types;
