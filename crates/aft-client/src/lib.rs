//! aft-client: client library for the aft telemetry bus.
//!
//! Connects to the analytics worker over a WebSocket duplex channel,
//! maintains the connection state machine, drives the session lifecycle
//! (start / stop / calibrate), buffers samples for the current session,
//! and serializes completed sessions to export artifacts.
//!
//! # Quick Start
//!
//! ```no_run
//! use aft_client::SessionController;
//!
//! # async fn example() -> aft_core::AftResult<()> {
//! let mut controller = SessionController::new();
//! let mut events = controller.connect("ws://127.0.0.1:8765").await?;
//!
//! controller.start().await?;
//! while let Some(event) = events.recv().await {
//!     for update in controller.handle_event(event) {
//!         println!("{update:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod controller;
pub mod export;
pub mod recorder;
pub mod transport;

// Re-export primary public types.
pub use client::{ConnectionState, TelemetryClient};
pub use controller::{LiveUpdate, Phase, SessionController};
pub use export::{build_artifact, export_blob, export_to_path, ExportArtifact};
pub use recorder::SessionRecorder;
pub use transport::{Channel, ChannelEvent};

// Re-export aft-core error types for convenience.
pub use aft_core::{AftError, AftResult};
