//! Gateway: runs the bot process.
//!
//! Serves an HTTP health probe and the Telegram webhook, drives the long-poll connector, and
//! dispatches every inbound message to the session coordinator in its own task.

mod server;

pub use server::{router, run_gateway, spawn_dispatcher, GatewayState};
