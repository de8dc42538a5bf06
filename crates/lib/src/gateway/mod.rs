//! Gateway: HTTP listener and bot runtime.
//!
//! Single port serves the health probe and the Telegram webhook. Inbound messages from either
//! the webhook or the long-poll loop go through one queue to the dispatcher.

mod server;

pub use server::{
    build_router, run_gateway, spawn_eviction_sweep, spawn_inbound_processor, GatewayState,
    Startup,
};
