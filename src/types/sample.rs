//! Raw sensor samples delivered by the hardware bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An averaged analogue reading plus the most recent instantaneous value.
///
/// Produced externally (the bridge does outlier pruning and averaging);
/// immutable once delivered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub instant: f64,
    pub average: f64,
    pub timestamp: DateTime<Utc>,
}

/// Out-of-band health signal for a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    #[default]
    Ok,
    /// Sensor present but reporting garbage
    Fault,
    /// Sensor not detected on the bus
    Missing,
}

/// Payload of a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reading {
    /// Averaged analogue value (RPM, temperature, percent full)
    Measurement { instant: f64, average: f64 },
    /// Binary switch state (oil pressure switch, pump relay)
    Switch { on: bool },
    /// Range-finder distance for a tank, converted to percent full by the monitor
    Distance { instant: f64, average: f64 },
    /// Sensor fault / no-sensor side channel
    Status { status: SensorStatus },
}

/// One reading from one physical sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
}

impl Sample {
    pub fn new(device_id: impl Into<String>, timestamp: DateTime<Utc>, reading: Reading) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
            reading,
        }
    }

    /// Shorthand for an analogue measurement sample.
    pub fn measurement(
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        instant: f64,
        average: f64,
    ) -> Self {
        Self::new(device_id, timestamp, Reading::Measurement { instant, average })
    }

    /// Shorthand for a switch sample.
    pub fn switch(device_id: impl Into<String>, timestamp: DateTime<Utc>, on: bool) -> Self {
        Self::new(device_id, timestamp, Reading::Switch { on })
    }

    /// Shorthand for a sensor status sample.
    pub fn status(device_id: impl Into<String>, timestamp: DateTime<Utc>, status: SensorStatus) -> Self {
        Self::new(device_id, timestamp, Reading::Status { status })
    }

    /// The analogue part of this sample, if it carries one.
    pub fn as_measurement(&self) -> Option<Measurement> {
        match self.reading {
            Reading::Measurement { instant, average } => Some(Measurement {
                instant,
                average,
                timestamp: self.timestamp,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_tagged_json() {
        let reading: Reading =
            serde_json::from_str(r#"{"kind":"measurement","instant":1510.0,"average":1498.5}"#).unwrap();
        assert_eq!(
            reading,
            Reading::Measurement {
                instant: 1510.0,
                average: 1498.5
            }
        );

        let status: Reading = serde_json::from_str(r#"{"kind":"status","status":"missing"}"#).unwrap();
        assert_eq!(
            status,
            Reading::Status {
                status: SensorStatus::Missing
            }
        );
    }

    #[test]
    fn test_as_measurement_only_for_analogue() {
        let now = Utc::now();
        assert!(Sample::switch("oil", now, true).as_measurement().is_none());
        let m = Sample::measurement("rpm", now, 10.0, 12.0).as_measurement().unwrap();
        assert_eq!(m.average, 12.0);
        assert_eq!(m.timestamp, now);
    }
}
