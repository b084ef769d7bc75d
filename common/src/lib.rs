pub mod classify;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod press;
pub mod protocol;
pub mod types;

pub use classify::{classify, display_value, ClassificationEngine, DashboardView, ReadingView};
pub use command::{CommandFrame, CommandGateway, WindowCommand};
pub use config::KioskConfig;
pub use connection::{
    AttemptId, ConnectionEffect, ConnectionEvent, ConnectionManager, ConnectionState,
};
pub use error::{ChartError, GatewayError, ProtocolError, SendError};
pub use press::{BaseCommand, PressEffect, PressEvent, PressHoldController, PressPhase, SessionId};
pub use protocol::*;
pub use types::{
    Band, InboundMessage, InboundUpdate, Metric, SensorSnapshot, Source, ThresholdSet,
    WindowStatus,
};
