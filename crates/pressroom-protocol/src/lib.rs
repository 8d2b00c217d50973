//! Observer wire protocol: JSON text frames over WebSocket, tagged by `type`.
//!
//! ```text
//! client                         server
//!   ── connect {token?, kinds?} ──▶
//!   ◀── snapshot {server, jobs} ──
//!   ◀── event {seq, event} ───────   (repeated)
//!   ── ping ──────────────────────▶
//!   ◀── pong ─────────────────────
//!   ◀── ping ─────────────────────   (heartbeat)
//!   ── pong ──────────────────────▶
//! ```

pub mod frames;

pub use frames::{ClientFrame, JobSummary, ServerFrame, ServerInfo};

/// Bumped whenever a frame shape changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;
