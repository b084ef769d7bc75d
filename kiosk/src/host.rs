use std::{
    collections::{HashMap, VecDeque},
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::OnceLock,
    time::{Duration, Instant},
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use climate_common::{
    AttemptId, BaseCommand, ClassificationEngine, CommandGateway, ConnectionEffect,
    ConnectionEvent, ConnectionManager, DashboardView, GatewayError, InboundUpdate, KioskConfig,
    PressEffect, PressEvent, PressHoldController, PressPhase, SendError, SensorSnapshot,
    SessionId,
};

use crate::{http, transport};

pub enum KioskEvent {
    Connection(ConnectionEvent),
    TransportOpened {
        attempt: AttemptId,
        outbound: mpsc::UnboundedSender<String>,
    },
    Press {
        control: BaseCommand,
        event: PressEvent,
    },
    SendCommand {
        command: String,
        reply: oneshot::Sender<Result<(), CommandRejection>>,
    },
    Status(oneshot::Sender<StatusBody>),
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandRejection {
    #[error(transparent)]
    Invalid(#[from] GatewayError),
    #[error(transparent)]
    NotConnected(#[from] SendError),
    #[error("transport for attempt {0} is no longer accepting frames")]
    TransportGone(AttemptId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub at: DateTime<Utc>,
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ControlStatus {
    pub control: BaseCommand,
    pub phase: PressPhase,
    #[serde(rename = "heldMs")]
    pub held_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub connection: &'static str,
    #[serde(rename = "connectionAttempts")]
    pub connection_attempts: u64,
    #[serde(rename = "framesDropped")]
    pub frames_dropped: u64,
    #[serde(rename = "connectedForMs")]
    pub connected_for_ms: Option<u64>,
    #[serde(rename = "lastUpdate")]
    pub last_update: Option<DateTime<Utc>>,
    pub dashboard: DashboardView,
    pub controls: Vec<ControlStatus>,
    #[serde(rename = "allowedCommands")]
    pub allowed_commands: Vec<String>,
    pub notices: Vec<Notice>,
}

struct TransportLink {
    attempt: AttemptId,
    task: JoinHandle<()>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

/// Owns every piece of client state. Only the event loop touches it, one
/// event at a time, so each handler runs to completion without suspending.
pub struct Kiosk {
    config: KioskConfig,
    connection: ConnectionManager,
    classification: ClassificationEngine,
    gateway: CommandGateway,
    snapshot: SensorSnapshot,
    last_update: Option<DateTime<Utc>>,
    controls: HashMap<BaseCommand, PressHoldController>,
    press_timers: HashMap<BaseCommand, (SessionId, JoinHandle<()>)>,
    reconnect_timer: Option<JoinHandle<()>>,
    link: Option<TransportLink>,
    notices: VecDeque<Notice>,
    events: mpsc::UnboundedSender<KioskEvent>,
}

impl Kiosk {
    pub fn new(config: KioskConfig, events: mpsc::UnboundedSender<KioskEvent>) -> Self {
        let gateway = CommandGateway::new(config.commands.extra.iter().cloned());
        let controls = [BaseCommand::Open, BaseCommand::Close]
            .into_iter()
            .map(|control| (control, PressHoldController::new(config.timing.long_press_ms)))
            .collect();

        Self {
            connection: ConnectionManager::new(config.timing.reconnect_delay_ms),
            classification: ClassificationEngine::new(),
            gateway,
            snapshot: SensorSnapshot::default(),
            last_update: None,
            controls,
            press_timers: HashMap::new(),
            reconnect_timer: None,
            link: None,
            notices: VecDeque::new(),
            events,
            config,
        }
    }

    pub fn start(&mut self) {
        let effects = self.connection.connect();
        self.apply_connection_effects(effects);
    }

    pub fn shutdown(&mut self) {
        let effects = self.connection.shutdown();
        self.apply_connection_effects(effects);
        for (_, (_, timer)) in self.press_timers.drain() {
            timer.abort();
        }
        info!("kiosk event loop stopped");
    }

    pub fn handle_event(&mut self, event: KioskEvent) -> anyhow::Result<()> {
        let now_ms = monotonic_ms();

        match event {
            KioskEvent::Connection(event) => {
                let effects = self.connection.handle(event, now_ms);
                self.apply_connection_effects(effects);
            }
            KioskEvent::TransportOpened { attempt, outbound } => {
                // A stale attempt's sender is dropped here, which closes its socket.
                if let Some(link) = self.link.as_mut().filter(|link| link.attempt == attempt) {
                    link.outbound = Some(outbound);
                }
                let effects = self
                    .connection
                    .handle(ConnectionEvent::Opened { attempt }, now_ms);
                self.apply_connection_effects(effects);
            }
            KioskEvent::Press { control, event } => self.handle_press(control, event, now_ms)?,
            KioskEvent::SendCommand { command, reply } => {
                let result = self.send_command(&command);
                let _ = reply.send(result);
            }
            KioskEvent::Status(reply) => {
                let _ = reply.send(self.status(now_ms));
            }
            KioskEvent::Shutdown => self.shutdown(),
        }

        Ok(())
    }

    fn apply_connection_effects(&mut self, effects: Vec<ConnectionEffect>) {
        for effect in effects {
            match effect {
                ConnectionEffect::OpenTransport { attempt } => {
                    if let Some(previous) = self.link.take() {
                        previous.task.abort();
                    }
                    info!(attempt, url = %self.config.server.ws_url, "connecting");
                    let task = transport::spawn_transport(
                        self.config.server.ws_url.clone(),
                        attempt,
                        self.events.clone(),
                    );
                    self.link = Some(TransportLink {
                        attempt,
                        task,
                        outbound: None,
                    });
                }
                ConnectionEffect::CloseTransport { attempt } => {
                    if self.link.as_ref().is_some_and(|link| link.attempt == attempt) {
                        if let Some(link) = self.link.take() {
                            close_link(link);
                        }
                    }
                }
                ConnectionEffect::ScheduleReconnect { after_ms } => {
                    self.cancel_reconnect_timer();
                    info!(after_ms, "reconnect scheduled");
                    let events = self.events.clone();
                    self.reconnect_timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(after_ms)).await;
                        let _ = events.send(KioskEvent::Connection(
                            ConnectionEvent::ReconnectTimerFired,
                        ));
                    }));
                }
                ConnectionEffect::CancelReconnect => self.cancel_reconnect_timer(),
                ConnectionEffect::Connected => {
                    self.reconnect_timer = None;
                    info!(attempt = self.connection.current_attempt(), "connected");
                    self.notify(NoticeLevel::Info, "connected to server".to_string());
                }
                ConnectionEffect::Disconnected { reason } => {
                    if let Some(link) = self.link.take() {
                        close_link(link);
                    }
                    warn!("connection lost: {reason}");
                    self.notify(
                        NoticeLevel::Warning,
                        retry_notice(self.connection.reconnect_delay_ms()),
                    );
                }
                ConnectionEffect::Deliver(update) => self.apply_update(update),
                ConnectionEffect::Dropped { reason } => {
                    warn!(
                        dropped = self.connection.frames_dropped(),
                        "dropping inbound frame: {reason}"
                    );
                }
            }
        }
    }

    fn apply_update(&mut self, update: InboundUpdate) {
        match update {
            InboundUpdate::Thresholds(thresholds) => {
                debug!(?thresholds, "thresholds replaced");
                self.classification.replace_thresholds(thresholds);
            }
            InboundUpdate::Snapshot(snapshot) => {
                debug!("sensor snapshot replaced");
                self.snapshot = snapshot;
                self.last_update = Some(Utc::now());
            }
            InboundUpdate::CommandConfirmed(command) => {
                info!(%command, "server confirmed command");
                self.notify(NoticeLevel::Info, format!("window command {command} sent"));
            }
            InboundUpdate::ServerError { message, source } => {
                let source = source.unwrap_or_else(|| "server".to_string());
                warn!(%source, "server reported error: {message}");
                self.notify(NoticeLevel::Error, format!("{source}: {message}"));
            }
        }
    }

    fn handle_press(
        &mut self,
        control: BaseCommand,
        event: PressEvent,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        if let PressEvent::TimerFired(session) = event {
            if self
                .press_timers
                .get(&control)
                .is_some_and(|(armed, _)| *armed == session)
            {
                self.press_timers.remove(&control);
            }
        }

        let controller = self
            .controls
            .get_mut(&control)
            .with_context(|| format!("no press controller for {}", control.as_str()))?;
        let held_ms = controller.held_ms(now_ms);
        let effects = controller.handle(event, now_ms);
        debug!(control = control.as_str(), ?event, ?held_ms, "press event");

        for effect in effects {
            match effect {
                PressEffect::ArmTimer { session, after_ms } => {
                    if let Some((_, previous)) = self.press_timers.remove(&control) {
                        previous.abort();
                    }
                    let events = self.events.clone();
                    let timer = tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(after_ms)).await;
                        let _ = events.send(KioskEvent::Press {
                            control,
                            event: PressEvent::TimerFired(session),
                        });
                    });
                    self.press_timers.insert(control, (session, timer));
                }
                PressEffect::CancelTimer(session) => {
                    if self
                        .press_timers
                        .get(&control)
                        .is_some_and(|(armed, _)| *armed == session)
                    {
                        if let Some((_, timer)) = self.press_timers.remove(&control) {
                            timer.abort();
                        }
                    }
                }
                PressEffect::Send(command) => {
                    info!(control = control.as_str(), command = command.as_str(), "press resolved");
                    // Rejections are already logged and surfaced by send_command.
                    let _ = self.send_command(command.as_str());
                }
            }
        }

        Ok(())
    }

    fn send_command(&mut self, command: &str) -> Result<(), CommandRejection> {
        let result = self.transmit_command(command);
        if let Err(err) = &result {
            warn!(%command, "command rejected: {err}");
            self.notify(
                NoticeLevel::Warning,
                format!("command {command} rejected: {err}"),
            );
        }
        result
    }

    fn transmit_command(&self, command: &str) -> Result<(), CommandRejection> {
        let frame = self.gateway.encode(command)?;
        let frame = self.connection.send(frame)?;
        let attempt = self.connection.current_attempt();
        let outbound = self
            .link
            .as_ref()
            .filter(|link| link.attempt == attempt)
            .and_then(|link| link.outbound.as_ref())
            .ok_or(CommandRejection::TransportGone(attempt))?;
        outbound
            .send(frame)
            .map_err(|_| CommandRejection::TransportGone(attempt))?;
        debug!(%command, attempt, "command frame queued");
        Ok(())
    }

    fn notify(&mut self, level: NoticeLevel, message: String) {
        while self.notices.len() >= self.config.timing.notice_history {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            at: Utc::now(),
            level,
            message,
        });
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    fn status(&self, now_ms: u64) -> StatusBody {
        let mut controls: Vec<ControlStatus> = self
            .controls
            .iter()
            .map(|(control, controller)| ControlStatus {
                control: *control,
                phase: controller.phase(),
                held_ms: controller.held_ms(now_ms),
            })
            .collect();
        controls.sort_by_key(|status| status.control.as_str());

        StatusBody {
            connection: self.connection.state().as_str(),
            connection_attempts: self.connection.attempts_total(),
            frames_dropped: self.connection.frames_dropped(),
            connected_for_ms: self
                .connection
                .last_open_ms()
                .filter(|_| self.connection.is_open())
                .map(|since| now_ms.saturating_sub(since)),
            last_update: self.last_update,
            dashboard: self.classification.view(&self.snapshot),
            controls,
            allowed_commands: self.gateway.allowed().map(str::to_string).collect(),
            notices: self.notices.iter().cloned().collect(),
        }
    }
}

fn retry_notice(delay_ms: u64) -> String {
    if delay_ms % 1_000 == 0 {
        format!("connection lost, retrying in {}s", delay_ms / 1_000)
    } else {
        format!("connection lost, retrying in {delay_ms} ms")
    }
}

fn close_link(link: TransportLink) {
    match link.outbound {
        // Dropping the sender lets the transport task close the socket.
        Some(outbound) => drop(outbound),
        None => link.task.abort(),
    }
}

pub async fn run_event_loop(mut kiosk: Kiosk, mut events: mpsc::UnboundedReceiver<KioskEvent>) {
    kiosk.start();

    while let Some(event) = events.recv().await {
        let stop = matches!(event, KioskEvent::Shutdown);
        if let Err(err) = kiosk.handle_event(event) {
            error!("event handling failed: {err:#}");
            kiosk.notify(NoticeLevel::Error, "unexpected error, see log".to_string());
        }
        if stop {
            break;
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut config = store.load().await.unwrap_or_else(|err| {
        warn!("failed to load kiosk config from {}: {err:#}", store.path.display());
        KioskConfig::default()
    });
    apply_env_overrides(&mut config);
    for dropped in config.sanitize() {
        warn!("ignoring invalid extra command identifier {dropped:?}");
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let kiosk = Kiosk::new(config.clone(), events_tx.clone());
    let event_loop = tokio::spawn(run_event_loop(kiosk, events_rx));

    let app = http::router(
        http::HttpState::new(events_tx.clone(), config.server.chart_base_url.clone()),
        &config.http.web_root,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind kiosk server at {addr}"))?;

    info!("kiosk listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(events_tx))
        .await?;

    event_loop.await.context("event loop task failed")?;
    Ok(())
}

async fn shutdown_signal(events: mpsc::UnboundedSender<KioskEvent>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    let _ = events.send(KioskEvent::Shutdown);
}

struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    fn new() -> Self {
        let path = std::env::var("KIOSK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.kiosk/config.json"));
        Self { path }
    }

    async fn load(&self) -> anyhow::Result<KioskConfig> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice::<KioskConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(KioskConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn apply_env_overrides(config: &mut KioskConfig) {
    if let Ok(url) = std::env::var("KIOSK_SERVER_URL") {
        if let Some(base) = transport::http_base_from_ws(&url) {
            config.server.chart_base_url = base;
        }
        config.server.ws_url = url;
    }
    if let Ok(base) = std::env::var("KIOSK_CHART_BASE_URL") {
        config.server.chart_base_url = base;
    }
    if let Some(port) = std::env::var("KIOSK_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        config.http.port = port;
    }
    if let Ok(web_root) = std::env::var("KIOSK_WEB_ROOT") {
        config.http.web_root = web_root;
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
