use serde::{Deserialize, Serialize};

use crate::{
    command::is_valid_identifier,
    protocol::{DEFAULT_LONG_PRESS_MS, DEFAULT_RECONNECT_DELAY_MS},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ws_url: String,
    pub chart_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8000/ws".to_string(),
            chart_base_url: "http://127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub reconnect_delay_ms: u64,
    pub long_press_ms: u64,
    pub notice_history: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            long_press_ms: DEFAULT_LONG_PRESS_MS,
            notice_history: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default)]
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub web_root: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            web_root: "./web".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KioskConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub commands: CommandConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl TimingConfig {
    pub fn sanitize(&mut self) {
        self.reconnect_delay_ms = self.reconnect_delay_ms.clamp(100, 60_000);
        self.long_press_ms = self.long_press_ms.clamp(100, 10_000);
        self.notice_history = self.notice_history.clamp(1, 200);
    }
}

impl CommandConfig {
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        let mut kept: Vec<String> = Vec::with_capacity(self.extra.len());
        for command in self.extra.drain(..) {
            let command = command.trim().to_string();
            if !is_valid_identifier(&command) {
                dropped.push(command);
            } else if !kept.contains(&command) {
                kept.push(command);
            }
        }
        self.extra = kept;
        dropped
    }
}

impl KioskConfig {
    pub fn sanitize(&mut self) -> Vec<String> {
        self.timing.sanitize();
        if self.server.ws_url.trim().is_empty() {
            self.server.ws_url = ServerConfig::default().ws_url;
        }
        if self.server.chart_base_url.trim().is_empty() {
            self.server.chart_base_url = ServerConfig::default().chart_base_url;
        }
        self.commands.sanitize()
    }
}
