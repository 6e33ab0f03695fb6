//! CDP (Chrome DevTools Protocol) Client Implementation
//!
//! Single WebSocket connection, multiplexed flat sessions, typed Network events.

pub mod client;
pub mod protocol;
pub mod session;

pub use client::{CDPClient, CDPError};
pub use protocol::{CDPEvent, CDPRequest, CDPResponse, NetworkEvent};
pub use session::CDPSession;
