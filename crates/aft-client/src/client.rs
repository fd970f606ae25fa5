//! The telemetry client: connection state plus the outbound command path.
//!
//! Connection state transitions only on channel lifecycle events — opening,
//! close, error — never directly by application logic. The state machine:
//! Disconnected → Connecting → Connected, with Errored on failure and
//! Disconnected again on close from either side.

use tokio::sync::mpsc;

use aft_core::error::{AftError, AftResult};
use aft_core::messages::{encode_command, Command};

use crate::transport::{Channel, ChannelEvent};

/// Lifecycle state of the duplex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Owns the duplex channel to the worker and its connection state.
pub struct TelemetryClient {
    state: ConnectionState,
    channel: Option<Channel>,
}

impl Default for TelemetryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryClient {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            channel: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Open the channel to the worker endpoint.
    ///
    /// Returns the receiver for the channel's ordered event queue. On
    /// failure the state lands on `Errored`; reconnecting is a manual
    /// caller action, never an automatic retry.
    pub async fn connect(&mut self, endpoint: &str) -> AftResult<mpsc::Receiver<ChannelEvent>> {
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            return Err(AftError::Channel("already connected".into()));
        }

        self.state = ConnectionState::Connecting;

        match Channel::connect(endpoint).await {
            Ok((channel, events)) => {
                self.channel = Some(channel);
                self.state = ConnectionState::Connected;
                Ok(events)
            }
            Err(e) => {
                self.state = ConnectionState::Errored;
                tracing::warn!(endpoint, error = %e, "channel connect failed");
                Err(e)
            }
        }
    }

    /// Serialize and send a command frame.
    ///
    /// Fails with [`AftError::ChannelNotOpen`] unless the state is
    /// `Connected` — nothing is written in that case.
    pub async fn send_command(&self, command: Command) -> AftResult<()> {
        if self.state != ConnectionState::Connected {
            return Err(AftError::ChannelNotOpen);
        }
        let channel = self.channel.as_ref().ok_or(AftError::ChannelNotOpen)?;

        let text = encode_command(command)?;
        channel.send_text(text).await?;
        tracing::debug!(command = %command, "command sent");
        Ok(())
    }

    /// Apply a peer-initiated close (called when the event queue yields
    /// `Closed`).
    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.channel = None;
    }

    /// Apply a transport failure (called when the event queue yields
    /// `Error`).
    pub fn mark_errored(&mut self) {
        self.state = ConnectionState::Errored;
        self.channel = None;
    }

    /// Close the channel from our side.
    pub async fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
        self.state = ConnectionState::Disconnected;
    }
}
