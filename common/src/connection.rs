use serde::Serialize;

use crate::{
    error::{ProtocolError, SendError},
    protocol::{DEFAULT_RECONNECT_DELAY_MS, MAX_INBOUND_FRAME_BYTES},
    types::{InboundMessage, InboundUpdate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    ReconnectScheduled,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::ReconnectScheduled => "reconnect_scheduled",
        }
    }
}

/// Identifies one transport attempt. Events from older attempts are ignored.
pub type AttemptId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened { attempt: AttemptId },
    Failed { attempt: AttemptId, reason: String },
    Closed { attempt: AttemptId, reason: Option<String> },
    Frame { attempt: AttemptId, text: String },
    ReconnectTimerFired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEffect {
    OpenTransport { attempt: AttemptId },
    CloseTransport { attempt: AttemptId },
    ScheduleReconnect { after_ms: u64 },
    CancelReconnect,
    Connected,
    Disconnected { reason: String },
    Deliver(InboundUpdate),
    Dropped { reason: String },
}

/// Owns the transport lifecycle as an explicit state machine. At most one
/// attempt is live and at most one reconnect is pending at any time.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    state: ConnectionState,
    reconnect_delay_ms: u64,
    attempt: AttemptId,
    attempts_total: u64,
    frames_dropped: u64,
    last_open_ms: Option<u64>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY_MS)
    }
}

impl ConnectionManager {
    pub fn new(reconnect_delay_ms: u64) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_delay_ms,
            attempt: 0,
            attempts_total: 0,
            frames_dropped: 0,
            last_open_ms: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn current_attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn attempts_total(&self) -> u64 {
        self.attempts_total
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn last_open_ms(&self) -> Option<u64> {
        self.last_open_ms
    }

    pub fn reconnect_delay_ms(&self) -> u64 {
        self.reconnect_delay_ms
    }

    pub fn connect(&mut self) -> Vec<ConnectionEffect> {
        if self.state != ConnectionState::Disconnected {
            return Vec::new();
        }

        self.attempt = self.attempt.wrapping_add(1);
        self.attempts_total = self.attempts_total.saturating_add(1);
        self.state = ConnectionState::Connecting;
        vec![ConnectionEffect::OpenTransport {
            attempt: self.attempt,
        }]
    }

    pub fn shutdown(&mut self) -> Vec<ConnectionEffect> {
        let mut effects = Vec::new();
        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::ReconnectScheduled => effects.push(ConnectionEffect::CancelReconnect),
            ConnectionState::Connecting | ConnectionState::Open => {
                effects.push(ConnectionEffect::CloseTransport {
                    attempt: self.attempt,
                });
            }
        }
        self.state = ConnectionState::Disconnected;
        effects
    }

    pub fn handle(&mut self, event: ConnectionEvent, now_ms: u64) -> Vec<ConnectionEffect> {
        match event {
            ConnectionEvent::Opened { attempt } => self.on_opened(attempt, now_ms),
            ConnectionEvent::Failed { attempt, reason } => self.on_lost(attempt, reason),
            ConnectionEvent::Closed { attempt, reason } => self.on_lost(
                attempt,
                reason.unwrap_or_else(|| "connection closed".to_string()),
            ),
            ConnectionEvent::Frame { attempt, text } => self.on_frame(attempt, &text),
            ConnectionEvent::ReconnectTimerFired => self.on_reconnect_timer(),
        }
    }

    pub fn send(&self, frame: String) -> Result<String, SendError> {
        if self.state != ConnectionState::Open {
            return Err(SendError::NotConnected(self.state.as_str()));
        }
        Ok(frame)
    }

    fn is_current(&self, attempt: AttemptId) -> bool {
        attempt == self.attempt
    }

    fn on_opened(&mut self, attempt: AttemptId, now_ms: u64) -> Vec<ConnectionEffect> {
        if !self.is_current(attempt) || self.state != ConnectionState::Connecting {
            return vec![ConnectionEffect::CloseTransport { attempt }];
        }

        self.state = ConnectionState::Open;
        self.last_open_ms = Some(now_ms);
        vec![ConnectionEffect::Connected]
    }

    // Close and error may both arrive for one transport; only the first schedules.
    fn on_lost(&mut self, attempt: AttemptId, reason: String) -> Vec<ConnectionEffect> {
        if !self.is_current(attempt) {
            return Vec::new();
        }
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.state = ConnectionState::ReconnectScheduled;
                vec![
                    ConnectionEffect::Disconnected { reason },
                    ConnectionEffect::ScheduleReconnect {
                        after_ms: self.reconnect_delay_ms,
                    },
                ]
            }
            ConnectionState::Disconnected | ConnectionState::ReconnectScheduled => Vec::new(),
        }
    }

    fn on_frame(&mut self, attempt: AttemptId, text: &str) -> Vec<ConnectionEffect> {
        if !self.is_current(attempt) || self.state != ConnectionState::Open {
            return Vec::new();
        }

        match parse_frame(text) {
            Ok(message) => message
                .into_updates()
                .into_iter()
                .map(ConnectionEffect::Deliver)
                .collect(),
            Err(err) => {
                self.frames_dropped = self.frames_dropped.saturating_add(1);
                vec![ConnectionEffect::Dropped {
                    reason: err.to_string(),
                }]
            }
        }
    }

    fn on_reconnect_timer(&mut self) -> Vec<ConnectionEffect> {
        if self.state != ConnectionState::ReconnectScheduled {
            return Vec::new();
        }
        self.state = ConnectionState::Disconnected;
        self.connect()
    }
}

pub fn parse_frame(text: &str) -> Result<InboundMessage, ProtocolError> {
    if text.len() > MAX_INBOUND_FRAME_BYTES {
        return Err(ProtocolError::Oversized(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ThresholdSet, WindowStatus};
    use pretty_assertions::assert_eq;

    fn open_manager() -> ConnectionManager {
        let mut manager = ConnectionManager::new(3_000);
        manager.connect();
        let attempt = manager.current_attempt();
        manager.handle(ConnectionEvent::Opened { attempt }, 10);
        manager
    }

    #[test]
    fn connect_opens_one_transport() {
        let mut manager = ConnectionManager::default();
        assert_eq!(
            manager.connect(),
            vec![ConnectionEffect::OpenTransport { attempt: 1 }]
        );
        assert_eq!(manager.state(), ConnectionState::Connecting);

        assert!(manager.connect().is_empty());
        assert_eq!(manager.attempts_total(), 1);

        assert_eq!(
            manager.handle(ConnectionEvent::Opened { attempt: 1 }, 50),
            vec![ConnectionEffect::Connected]
        );
        assert!(manager.is_open());
        assert_eq!(manager.last_open_ms(), Some(50));
        assert!(manager.connect().is_empty());
    }

    #[test]
    fn close_then_error_schedules_a_single_reconnect() {
        let mut manager = open_manager();
        let attempt = manager.current_attempt();

        let effects = manager.handle(
            ConnectionEvent::Closed {
                attempt,
                reason: None,
            },
            100,
        );
        assert_eq!(
            effects,
            vec![
                ConnectionEffect::Disconnected {
                    reason: "connection closed".to_string()
                },
                ConnectionEffect::ScheduleReconnect { after_ms: 3_000 }
            ]
        );
        assert_eq!(manager.state(), ConnectionState::ReconnectScheduled);

        let again = manager.handle(
            ConnectionEvent::Failed {
                attempt,
                reason: "reset by peer".to_string(),
            },
            101,
        );
        assert!(again.is_empty());
        assert!(manager.connect().is_empty());
    }

    #[test]
    fn reconnect_timer_starts_next_attempt() {
        let mut manager = open_manager();
        manager.handle(
            ConnectionEvent::Failed {
                attempt: 1,
                reason: "refused".to_string(),
            },
            100,
        );

        assert_eq!(
            manager.handle(ConnectionEvent::ReconnectTimerFired, 3_100),
            vec![ConnectionEffect::OpenTransport { attempt: 2 }]
        );
        assert_eq!(manager.state(), ConnectionState::Connecting);

        assert!(manager
            .handle(ConnectionEvent::ReconnectTimerFired, 3_200)
            .is_empty());
    }

    #[test]
    fn failed_connect_retries_indefinitely() {
        let mut manager = ConnectionManager::new(3_000);
        manager.connect();
        for attempt in 1..=50 {
            let effects = manager.handle(
                ConnectionEvent::Failed {
                    attempt,
                    reason: "refused".to_string(),
                },
                attempt * 3_000,
            );
            assert!(effects.contains(&ConnectionEffect::ScheduleReconnect { after_ms: 3_000 }));
            assert_eq!(
                manager.handle(ConnectionEvent::ReconnectTimerFired, attempt * 3_000 + 1),
                vec![ConnectionEffect::OpenTransport {
                    attempt: attempt + 1
                }]
            );
        }
        assert_eq!(manager.attempts_total(), 51);
    }

    #[test]
    fn events_from_stale_attempts_are_ignored() {
        let mut manager = open_manager();
        manager.handle(
            ConnectionEvent::Closed {
                attempt: 1,
                reason: None,
            },
            100,
        );
        manager.handle(ConnectionEvent::ReconnectTimerFired, 3_100);
        assert_eq!(manager.current_attempt(), 2);

        let frame = r#"{"thresholds":{}}"#.to_string();
        assert!(manager
            .handle(ConnectionEvent::Frame { attempt: 1, text: frame }, 3_150)
            .is_empty());
        assert!(manager
            .handle(
                ConnectionEvent::Closed {
                    attempt: 1,
                    reason: None
                },
                3_160
            )
            .is_empty());
        assert_eq!(manager.state(), ConnectionState::Connecting);

        assert_eq!(
            manager.handle(ConnectionEvent::Opened { attempt: 1 }, 3_170),
            vec![ConnectionEffect::CloseTransport { attempt: 1 }]
        );
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn frames_are_delivered_in_order() {
        let mut manager = open_manager();
        let text = r#"{"type":"update","thresholds":{"gas":{"min":1,"limit_line":2}},"data":{"window":{"status":"open"}}}"#;
        let effects = manager.handle(
            ConnectionEvent::Frame {
                attempt: 1,
                text: text.to_string(),
            },
            20,
        );

        assert_eq!(effects.len(), 2);
        assert!(matches!(
            &effects[0],
            ConnectionEffect::Deliver(InboundUpdate::Thresholds(ThresholdSet { gas: Some(_), .. }))
        ));
        assert!(matches!(
            &effects[1],
            ConnectionEffect::Deliver(InboundUpdate::Snapshot(_))
        ));
    }

    #[test]
    fn unknown_window_status_does_not_drop_the_frame() {
        let mut manager = open_manager();
        let text = r#"{"type":"initial","thresholds":{"temperature":{"max":25,"limit_high":22,"limit_low":19}},"data":{"indoor":{"temperature":21.6,"humidity":48,"gas":48500},"window":{"status":"unknown","position":0}}}"#;
        let effects = manager.handle(
            ConnectionEvent::Frame {
                attempt: 1,
                text: text.to_string(),
            },
            20,
        );

        assert_eq!(effects.len(), 2);
        assert!(matches!(
            &effects[0],
            ConnectionEffect::Deliver(InboundUpdate::Thresholds(ThresholdSet { temperature: Some(_), .. }))
        ));
        match &effects[1] {
            ConnectionEffect::Deliver(InboundUpdate::Snapshot(snapshot)) => {
                assert_eq!(snapshot.indoor_gas(), Some(48_500.0));
                assert_eq!(snapshot.window_status(), Some(WindowStatus::Unknown));
            }
            other => panic!("unexpected effect: {other:?}"),
        }
        assert_eq!(manager.frames_dropped(), 0);
    }

    #[test]
    fn unknown_message_type_is_processed_for_its_fields() {
        let mut manager = open_manager();
        let text = r#"{"type":"ping","thresholds":{"gas":{"min":1,"limit_line":2}},"data":{"window":{"status":null}}}"#;
        let effects = manager.handle(
            ConnectionEvent::Frame {
                attempt: 1,
                text: text.to_string(),
            },
            20,
        );

        assert_eq!(effects.len(), 2);
        assert!(matches!(
            &effects[0],
            ConnectionEffect::Deliver(InboundUpdate::Thresholds(ThresholdSet { gas: Some(_), .. }))
        ));
        match &effects[1] {
            ConnectionEffect::Deliver(InboundUpdate::Snapshot(snapshot)) => {
                assert_eq!(snapshot.window_status(), None);
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn malformed_frames_are_dropped_without_closing() {
        let mut manager = open_manager();
        let effects = manager.handle(
            ConnectionEvent::Frame {
                attempt: 1,
                text: "{not json".to_string(),
            },
            20,
        );
        assert!(matches!(effects.as_slice(), [ConnectionEffect::Dropped { .. }]));
        assert!(manager.is_open());
        assert_eq!(manager.frames_dropped(), 1);

        let oversized = format!(r#"{{"type":"{}"}}"#, "x".repeat(MAX_INBOUND_FRAME_BYTES));
        let effects = manager.handle(
            ConnectionEvent::Frame {
                attempt: 1,
                text: oversized,
            },
            21,
        );
        assert!(matches!(effects.as_slice(), [ConnectionEffect::Dropped { .. }]));
        assert!(manager.is_open());
    }

    #[test]
    fn send_requires_open_state() {
        let mut manager = ConnectionManager::default();
        assert_eq!(
            manager.send("{}".to_string()),
            Err(SendError::NotConnected("disconnected"))
        );
        manager.connect();
        assert_eq!(
            manager.send("{}".to_string()),
            Err(SendError::NotConnected("connecting"))
        );
        manager.handle(ConnectionEvent::Opened { attempt: 1 }, 5);
        assert_eq!(manager.send("{}".to_string()), Ok("{}".to_string()));
    }

    #[test]
    fn shutdown_cancels_pending_work() {
        let mut manager = open_manager();
        assert_eq!(
            manager.shutdown(),
            vec![ConnectionEffect::CloseTransport { attempt: 1 }]
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.connect();
        manager.handle(
            ConnectionEvent::Failed {
                attempt: 2,
                reason: "refused".to_string(),
            },
            10,
        );
        assert_eq!(manager.shutdown(), vec![ConnectionEffect::CancelReconnect]);
        assert!(manager.shutdown().is_empty());
    }
}
