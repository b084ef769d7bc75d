use crate::{error::ChartError, types::Metric};

pub const MSG_WINDOW_COMMAND: &str = "window_command";
pub const MSG_INITIAL: &str = "initial";
pub const MSG_UPDATE: &str = "update";
pub const MSG_DATA: &str = "data";
pub const MSG_COMMAND_SENT: &str = "command_sent";
pub const MSG_ERROR: &str = "error";

pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;
pub const DEFAULT_LONG_PRESS_MS: u64 = 1_000;

pub const MAX_INBOUND_FRAME_BYTES: usize = 64 * 1024;

pub const CHART_MIN_DAYS: u16 = 1;
pub const CHART_MAX_DAYS: u16 = 14;

pub fn chart_url(base_url: &str, metric: Metric, days: u16) -> Result<String, ChartError> {
    if !(CHART_MIN_DAYS..=CHART_MAX_DAYS).contains(&days) {
        return Err(ChartError::DaysOutOfRange(days));
    }
    let base = base_url.trim_end_matches('/');
    Ok(format!("{base}/api/graf/{}?dage={days}", metric.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_url_strips_trailing_slash() {
        let url = chart_url("http://10.0.0.2:8000/", Metric::Gas, 7).unwrap();
        assert_eq!(url, "http://10.0.0.2:8000/api/graf/gas?dage=7");
    }

    #[test]
    fn chart_days_are_bounded() {
        assert_eq!(
            chart_url("http://x", Metric::Temperature, 0),
            Err(ChartError::DaysOutOfRange(0))
        );
        assert_eq!(
            chart_url("http://x", Metric::Humidity, 15),
            Err(ChartError::DaysOutOfRange(15))
        );
        assert!(chart_url("http://x", Metric::Humidity, 14).is_ok());
    }
}
