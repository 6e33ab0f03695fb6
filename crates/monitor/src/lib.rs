//! Network Traffic Monitor
//!
//! Attaches to a browser tab over the Chrome DevTools Protocol, rebuilds every
//! HTTP(S) request from its `Network.*` events, classifies it by domain and
//! streams consolidated records to a dashboard sink.
//!
//! # Layout
//!
//! 1. **cdp / debugger**: WebSocket transport, flat target sessions, typed events
//! 2. **tracker**: per-request state machine and record emission
//! 3. **session / service**: attach/detach lifecycle, one task owns all state
//! 4. **events / stats**: sink messages and the dashboard's running numbers

pub mod cdp;
pub mod classifier;
pub mod config;
pub mod debugger;
pub mod error;
pub mod events;
pub mod records;
pub mod service;
pub mod session;
pub mod stats;
pub mod store;
pub mod tracker;

pub use cdp::{CDPClient, CDPSession, NetworkEvent};
pub use classifier::{classify, Category};
pub use config::MonitorConfig;
pub use debugger::{CdpDebugger, Debugger, TargetEvent};
pub use error::MonitorError;
pub use events::{SinkBus, SinkMessage};
pub use records::{ConsolidatedRecord, FailureRecord, RedirectHop};
pub use service::MonitorHandle;
pub use session::{SessionController, SessionState, SessionStatus};
pub use stats::{StatsCollector, TrafficStats};
pub use store::{JsonFileStore, MemoryStore, MetadataStore, SessionMetadata};
pub use tracker::RequestTracker;
