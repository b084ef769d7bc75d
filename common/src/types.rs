use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Humidity,
    Gas,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Gas => "gas",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "temperature" => Some(Self::Temperature),
            "humidity" => Some(Self::Humidity),
            "gas" => Some(Self::Gas),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Outdoor,
    Indoor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Normal,
    TooHigh,
    TooLow,
    Max,
    Min,
    Limit,
}

impl Band {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::TooHigh => "too_high",
            Self::TooLow => "too_low",
            Self::Max => "max",
            Self::Min => "min",
            Self::Limit => "limit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeLimits {
    pub max: f64,
    pub limit_high: f64,
    pub limit_low: f64,
}

/// Gas resistance limits, ordered low to high. Low readings are the adverse side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasLimits {
    pub min: f64,
    pub limit_line: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    #[serde(default)]
    pub temperature: Option<RangeLimits>,
    #[serde(default)]
    pub humidity: Option<RangeLimits>,
    #[serde(default)]
    pub gas: Option<GasLimits>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutdoorReadings {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub battery: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndoorReadings {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub gas: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowStatus {
    Open,
    Closed,
    // The server reports a placeholder until the window controller checks in.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    #[serde(default)]
    pub status: Option<WindowStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    #[serde(default)]
    pub sensor: Option<OutdoorReadings>,
    #[serde(default)]
    pub indoor: Option<IndoorReadings>,
    #[serde(default)]
    pub window: Option<WindowState>,
}

impl SensorSnapshot {
    pub fn outdoor_temperature(&self) -> Option<f64> {
        self.sensor.as_ref().and_then(|s| s.temperature)
    }

    pub fn outdoor_humidity(&self) -> Option<f64> {
        self.sensor.as_ref().and_then(|s| s.humidity)
    }

    pub fn outdoor_battery(&self) -> Option<f64> {
        self.sensor.as_ref().and_then(|s| s.battery)
    }

    pub fn indoor_temperature(&self) -> Option<f64> {
        self.indoor.as_ref().and_then(|s| s.temperature)
    }

    pub fn indoor_humidity(&self) -> Option<f64> {
        self.indoor.as_ref().and_then(|s| s.humidity)
    }

    pub fn indoor_gas(&self) -> Option<f64> {
        self.indoor.as_ref().and_then(|s| s.gas)
    }

    pub fn window_status(&self) -> Option<WindowStatus> {
        self.window.and_then(|w| w.status)
    }
}

/// Server → client frame. Every field is optional and applied independently.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub thresholds: Option<ThresholdSet>,
    #[serde(default)]
    pub data: Option<SensorSnapshot>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundUpdate {
    Thresholds(ThresholdSet),
    Snapshot(SensorSnapshot),
    CommandConfirmed(String),
    ServerError { message: String, source: Option<String> },
}

impl InboundMessage {
    /// Splits the message into independent updates, thresholds first.
    pub fn into_updates(self) -> Vec<InboundUpdate> {
        let mut updates = Vec::new();
        if let Some(thresholds) = self.thresholds {
            updates.push(InboundUpdate::Thresholds(thresholds));
        }
        if let Some(snapshot) = self.data {
            updates.push(InboundUpdate::Snapshot(snapshot));
        }
        match self.kind.as_deref() {
            Some(crate::protocol::MSG_COMMAND_SENT) => {
                if let Some(command) = self.command {
                    updates.push(InboundUpdate::CommandConfirmed(command));
                }
            }
            Some(crate::protocol::MSG_ERROR) => {
                updates.push(InboundUpdate::ServerError {
                    message: self.error.unwrap_or_else(|| "unspecified server error".to_string()),
                    source: self.source,
                });
            }
            _ => {}
        }
        updates
    }
}
