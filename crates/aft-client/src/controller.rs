//! Session controller: the state machine driving which operations are
//! legal at any moment.
//!
//! Phases: `Idle` → `ConnectedIdle` → `Tracking` → `Stopped`, with a fall
//! back to `Idle` from anywhere when the channel closes or errors. Every
//! transition is event-driven — connection events or explicit user
//! commands; the controller never moves on a timer.

use chrono::Utc;

use aft_core::error::{AftError, AftResult};
use aft_core::messages::{Command, WorkerMessage};
use aft_core::samples::{EmotionSample, GazeSample};
use aft_core::session::{Session, SessionSummary};
use tokio::sync::mpsc;

use crate::client::{ConnectionState, TelemetryClient};
use crate::recorder::SessionRecorder;
use crate::transport::ChannelEvent;

/// Controller phase. Determines which user commands are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No channel. Tracking disabled.
    Idle,
    /// Channel open, no session running.
    ConnectedIdle,
    /// Session live; samples are being recorded.
    Tracking,
    /// Session frozen and exportable; channel still open.
    Stopped,
}

/// Updates surfaced to the presentation layer as events are consumed.
#[derive(Debug)]
pub enum LiveUpdate {
    Gaze(GazeSample),
    Emotion(EmotionSample),
    /// The channel went away; `error` is set when it failed rather than
    /// closed.
    ConnectionLost { error: Option<String> },
}

/// Owns the telemetry client and the session recorder, and applies the
/// transition rules between them.
pub struct SessionController {
    client: TelemetryClient,
    recorder: SessionRecorder,
    phase: Phase,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            client: TelemetryClient::new(),
            recorder: SessionRecorder::new(),
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    /// The current session — live while `Tracking`, frozen otherwise.
    pub fn session(&self) -> &Session {
        self.recorder.session()
    }

    pub fn can_start(&self) -> bool {
        matches!(self.phase, Phase::ConnectedIdle | Phase::Stopped)
    }

    pub fn can_stop(&self) -> bool {
        self.phase == Phase::Tracking
    }

    pub fn can_calibrate(&self) -> bool {
        self.phase == Phase::Tracking
    }

    /// Open the channel to the worker; transitions `Idle → ConnectedIdle`.
    ///
    /// Returns the channel's ordered event queue, to be drained through
    /// [`SessionController::handle_event`]. A frozen session from before a
    /// disconnect survives the reconnect.
    pub async fn connect(&mut self, endpoint: &str) -> AftResult<mpsc::Receiver<ChannelEvent>> {
        let events = self.client.connect(endpoint).await?;
        self.phase = Phase::ConnectedIdle;
        tracing::info!(endpoint, "controller connected");
        Ok(events)
    }

    /// Consume one channel event and apply its transitions.
    ///
    /// Telemetry frames dispatch samples only while `Tracking`; frames
    /// arriving in any other phase are dropped (the worker may keep
    /// emitting briefly after a stop — that is expected, not an error).
    pub fn handle_event(&mut self, event: ChannelEvent) -> Vec<LiveUpdate> {
        match event {
            ChannelEvent::Frame(WorkerMessage::TrackingData { data }) => {
                if self.phase != Phase::Tracking {
                    tracing::trace!("telemetry frame outside tracking, dropped");
                    return Vec::new();
                }

                let now = Utc::now();
                let mut updates = Vec::new();

                if let Some(reading) = &data.gaze {
                    let sample = GazeSample::from_reading(reading, now);
                    self.recorder.record_gaze(sample.clone());
                    updates.push(LiveUpdate::Gaze(sample));
                }
                if let Some(reading) = &data.emotion {
                    let sample = EmotionSample::from_reading(reading, now);
                    self.recorder.record_emotion(sample.clone());
                    updates.push(LiveUpdate::Emotion(sample));
                }

                updates
            }

            ChannelEvent::Frame(WorkerMessage::CommandResponse { command, status }) => {
                // Advisory only; never alters state.
                tracing::info!(command, status, "worker acknowledged command");
                Vec::new()
            }

            ChannelEvent::Closed => {
                tracing::info!("channel closed by peer");
                self.client.mark_closed();
                self.phase = Phase::Idle;
                vec![LiveUpdate::ConnectionLost { error: None }]
            }

            ChannelEvent::Error(message) => {
                tracing::warn!(error = %message, "channel failed");
                self.client.mark_errored();
                self.phase = Phase::Idle;
                vec![LiveUpdate::ConnectionLost {
                    error: Some(message),
                }]
            }
        }
    }

    /// Begin a new session: discards any frozen session, resets the
    /// recorder with `start_time = now`, and sends `start_tracking`.
    pub async fn start(&mut self) -> AftResult<()> {
        match self.phase {
            Phase::ConnectedIdle | Phase::Stopped => {}
            Phase::Idle => return Err(AftError::ChannelNotOpen),
            Phase::Tracking => {
                return Err(AftError::Other("tracking already in progress".into()))
            }
        }

        self.client.send_command(Command::StartTracking).await?;
        self.recorder.reset(Utc::now());
        self.phase = Phase::Tracking;
        tracing::info!("tracking started");
        Ok(())
    }

    /// Stop the session: sends `stop_tracking` best-effort and freezes the
    /// recorded session. Returns the summary computed at the stop instant.
    pub async fn stop(&mut self) -> AftResult<SessionSummary> {
        if self.phase != Phase::Tracking {
            return Err(AftError::Other("no session in progress".into()));
        }

        // Best-effort: the channel may already be gone, the session still
        // freezes either way.
        if let Err(e) = self.client.send_command(Command::StopTracking).await {
            tracing::warn!(error = %e, "stop_tracking not delivered");
        }

        self.phase = Phase::Stopped;
        let summary = SessionSummary::compute(self.recorder.session(), Utc::now());
        tracing::info!(
            gaze = summary.total_gaze_samples,
            emotion = summary.total_emotion_samples,
            "tracking stopped"
        );
        Ok(summary)
    }

    /// Ask the worker to recalibrate. Legal only while `Tracking`; no phase
    /// change.
    pub async fn calibrate(&mut self) -> AftResult<()> {
        if self.phase != Phase::Tracking {
            return Err(AftError::Other(
                "calibration requires an active session".into(),
            ));
        }
        self.client.send_command(Command::Calibrate).await
    }

    /// Close the channel from our side.
    pub async fn disconnect(&mut self) {
        self.client.disconnect().await;
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aft_core::messages::decode_frame;
    use futures_util::StreamExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    /// One-connection worker stub that records inbound command frames.
    async fn stub_worker() -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = mpsc::channel::<String>(8);
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text).await;
            }
        });
        (format!("ws://{addr}"), seen_rx)
    }

    fn gaze_frame(x: f64, y: f64) -> ChannelEvent {
        let text =
            format!(r#"{{"type":"tracking_data","data":{{"gaze":{{"GazeX":{x},"GazeY":{y}}}}}}}"#);
        ChannelEvent::Frame(decode_frame(&text).unwrap())
    }

    fn emotion_frame(label: &str) -> ChannelEvent {
        let text = format!(
            r#"{{"type":"tracking_data","data":{{"emotion":{{"emotion":"{label}","emotion_scores":{{"{label}":0.9}},"face_detected":true}}}}}}"#
        );
        ChannelEvent::Frame(decode_frame(&text).unwrap())
    }

    #[tokio::test]
    async fn start_requires_connection() {
        let mut controller = SessionController::new();
        assert_eq!(controller.phase(), Phase::Idle);
        assert!(!controller.can_start());

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, AftError::ChannelNotOpen));
    }

    #[tokio::test]
    async fn tracking_flow_records_and_freezes() {
        let (url, mut seen) = stub_worker().await;

        let mut controller = SessionController::new();
        let _events = controller.connect(&url).await.unwrap();
        assert_eq!(controller.phase(), Phase::ConnectedIdle);

        controller.start().await.unwrap();
        assert_eq!(controller.phase(), Phase::Tracking);
        assert_eq!(seen.recv().await.unwrap(), r#"{"command":"start_tracking"}"#);

        let updates = controller.handle_event(gaze_frame(0.5, 0.4));
        assert_eq!(updates.len(), 1);
        controller.handle_event(emotion_frame("happy"));

        let summary = controller.stop().await.unwrap();
        assert_eq!(controller.phase(), Phase::Stopped);
        assert_eq!(seen.recv().await.unwrap(), r#"{"command":"stop_tracking"}"#);
        assert_eq!(summary.total_gaze_samples, 1);
        assert_eq!(summary.total_emotion_samples, 1);
        assert_eq!(summary.primary_emotion, "happy");

        let session = controller.session();
        assert_eq!(session.gaze_samples.len(), 1);
        assert_eq!(session.gaze_samples[0].x, 0.5);
        assert_eq!(session.gaze_samples[0].y, 0.4);
    }

    #[tokio::test]
    async fn frames_outside_tracking_are_not_recorded() {
        let (url, _seen) = stub_worker().await;

        let mut controller = SessionController::new();
        let _events = controller.connect(&url).await.unwrap();

        // ConnectedIdle: frame arrives before any session started.
        let updates = controller.handle_event(gaze_frame(0.2, 0.2));
        assert!(updates.is_empty());
        assert!(controller.session().is_empty());

        controller.start().await.unwrap();
        controller.handle_event(gaze_frame(0.3, 0.3));
        controller.stop().await.unwrap();

        // Stopped: the worker may keep emitting briefly; nothing is added.
        controller.handle_event(gaze_frame(0.9, 0.9));
        assert_eq!(controller.session().gaze_samples.len(), 1);
    }

    #[tokio::test]
    async fn both_sections_in_one_frame_record_two_samples() {
        let (url, _seen) = stub_worker().await;

        let mut controller = SessionController::new();
        let _events = controller.connect(&url).await.unwrap();
        controller.start().await.unwrap();

        let text = r#"{"type":"tracking_data","data":{"gaze":{"GazeX":0.1,"GazeY":0.2},"emotion":{"emotion":"sad","emotion_scores":{"sad":0.7}}}}"#;
        let updates = controller.handle_event(ChannelEvent::Frame(decode_frame(text).unwrap()));
        assert_eq!(updates.len(), 2);
        assert_eq!(controller.session().sample_count(), 2);
    }

    #[tokio::test]
    async fn command_response_changes_nothing() {
        let (url, _seen) = stub_worker().await;

        let mut controller = SessionController::new();
        let _events = controller.connect(&url).await.unwrap();
        controller.start().await.unwrap();

        let text = r#"{"type":"command_response","command":"start_tracking","status":"success"}"#;
        let updates = controller.handle_event(ChannelEvent::Frame(decode_frame(text).unwrap()));
        assert!(updates.is_empty());
        assert_eq!(controller.phase(), Phase::Tracking);
        assert!(controller.session().is_empty());
    }

    #[tokio::test]
    async fn channel_loss_during_tracking_keeps_session_exportable() {
        let (url, _seen) = stub_worker().await;

        let mut controller = SessionController::new();
        let _events = controller.connect(&url).await.unwrap();
        controller.start().await.unwrap();
        controller.handle_event(gaze_frame(0.4, 0.6));

        let updates = controller.handle_event(ChannelEvent::Error("broken pipe".into()));
        assert!(matches!(
            updates.as_slice(),
            [LiveUpdate::ConnectionLost { error: Some(_) }]
        ));
        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.connection_state(), ConnectionState::Errored);

        // The recorded data survives for export.
        assert_eq!(controller.session().gaze_samples.len(), 1);

        // Tracking affordances are disabled again.
        assert!(!controller.can_stop());
        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, AftError::ChannelNotOpen));
    }

    #[tokio::test]
    async fn restart_discards_frozen_session() {
        let (url, _seen) = stub_worker().await;

        let mut controller = SessionController::new();
        let _events = controller.connect(&url).await.unwrap();

        controller.start().await.unwrap();
        controller.handle_event(gaze_frame(0.1, 0.1));
        controller.stop().await.unwrap();
        assert_eq!(controller.session().gaze_samples.len(), 1);

        controller.start().await.unwrap();
        assert!(controller.session().is_empty());
        assert_eq!(controller.phase(), Phase::Tracking);
    }

    #[tokio::test]
    async fn calibrate_only_while_tracking() {
        let (url, mut seen) = stub_worker().await;

        let mut controller = SessionController::new();
        let _events = controller.connect(&url).await.unwrap();

        let err = controller.calibrate().await.unwrap_err();
        assert!(matches!(err, AftError::Other(_)));

        controller.start().await.unwrap();
        controller.calibrate().await.unwrap();
        assert_eq!(controller.phase(), Phase::Tracking);

        assert_eq!(seen.recv().await.unwrap(), r#"{"command":"start_tracking"}"#);
        assert_eq!(seen.recv().await.unwrap(), r#"{"command":"calibrate"}"#);
    }
}
