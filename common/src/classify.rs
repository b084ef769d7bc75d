use serde::Serialize;

use crate::types::{
    Band, GasLimits, Metric, RangeLimits, SensorSnapshot, Source, ThresholdSet, WindowStatus,
};

/// Maps a reading to its band. Missing thresholds, a missing value or a
/// missing entry for `metric` all yield `Band::Normal`.
pub fn classify(metric: Metric, value: Option<f64>, thresholds: Option<&ThresholdSet>) -> Band {
    let (Some(value), Some(thresholds)) = (value, thresholds) else {
        return Band::Normal;
    };

    match metric {
        Metric::Temperature => thresholds
            .temperature
            .map(|limits| classify_range(value, &limits))
            .unwrap_or(Band::Normal),
        Metric::Humidity => thresholds
            .humidity
            .map(|limits| classify_range(value, &limits))
            .unwrap_or(Band::Normal),
        Metric::Gas => thresholds
            .gas
            .map(|limits| classify_gas(value, &limits))
            .unwrap_or(Band::Normal),
    }
}

// No floor escalation: only the ceiling has a second step.
fn classify_range(value: f64, limits: &RangeLimits) -> Band {
    if value >= limits.max {
        Band::Max
    } else if value >= limits.limit_high {
        Band::TooHigh
    } else if value <= limits.limit_low {
        Band::TooLow
    } else {
        Band::Normal
    }
}

fn classify_gas(value: f64, limits: &GasLimits) -> Band {
    if value <= limits.min {
        Band::Min
    } else if value <= limits.limit_line {
        Band::Limit
    } else {
        Band::Normal
    }
}

pub fn display_value(metric: Metric, source: Source, raw: f64) -> f64 {
    match (metric, source) {
        (Metric::Gas, _) => (raw / 1000.0).round(),
        (_, Source::Indoor) => raw.round(),
        (_, Source::Outdoor) => (raw * 10.0).round() / 10.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadingView {
    pub raw: Option<f64>,
    pub display: Option<f64>,
    pub band: Band,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutdoorView {
    pub temperature: ReadingView,
    pub humidity: ReadingView,
    pub battery: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndoorView {
    pub temperature: ReadingView,
    pub humidity: ReadingView,
    pub gas: ReadingView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub outdoor: OutdoorView,
    pub indoor: IndoorView,
    pub window: Option<WindowStatus>,
    pub thresholds: Option<ThresholdSet>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationEngine {
    thresholds: Option<ThresholdSet>,
}

impl ClassificationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thresholds(&self) -> Option<&ThresholdSet> {
        self.thresholds.as_ref()
    }

    pub fn replace_thresholds(&mut self, thresholds: ThresholdSet) {
        self.thresholds = Some(thresholds);
    }

    pub fn classify(&self, metric: Metric, value: Option<f64>) -> Band {
        classify(metric, value, self.thresholds.as_ref())
    }

    pub fn reading(&self, metric: Metric, source: Source, raw: Option<f64>) -> ReadingView {
        ReadingView {
            raw,
            display: raw.map(|value| display_value(metric, source, value)),
            band: self.classify(metric, raw),
        }
    }

    pub fn view(&self, snapshot: &SensorSnapshot) -> DashboardView {
        DashboardView {
            outdoor: OutdoorView {
                temperature: self.reading(
                    Metric::Temperature,
                    Source::Outdoor,
                    snapshot.outdoor_temperature(),
                ),
                humidity: self.reading(
                    Metric::Humidity,
                    Source::Outdoor,
                    snapshot.outdoor_humidity(),
                ),
                battery: snapshot.outdoor_battery(),
            },
            indoor: IndoorView {
                temperature: self.reading(
                    Metric::Temperature,
                    Source::Indoor,
                    snapshot.indoor_temperature(),
                ),
                humidity: self.reading(
                    Metric::Humidity,
                    Source::Indoor,
                    snapshot.indoor_humidity(),
                ),
                gas: self.reading(Metric::Gas, Source::Indoor, snapshot.indoor_gas()),
            },
            window: snapshot.window_status(),
            thresholds: self.thresholds.clone(),
        }
    }
}
