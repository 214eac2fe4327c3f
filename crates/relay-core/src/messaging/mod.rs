//! Messaging-platform abstractions: inbound relay payloads, outbound webhook
//! payload records, and the port the Discord adapter implements.

pub mod inbound;
pub mod port;
pub mod types;
