//! Frames broadcast by the vehicle detection service.

use std::collections::BTreeMap;

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Any frame the detection service sends on its event channel.
///
/// The service does not tag its frames, so the variant is picked by shape.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StatsFrame {
    /// Periodic detection counts
    Counts(DetectionCounts),
    /// Reply to a frame sent by the client
    Status(StatusReply),
}

impl StatsFrame {
    #[must_use]
    pub fn as_counts(&self) -> Option<&DetectionCounts> {
        match self {
            Self::Counts(counts) => Some(counts),
            Self::Status(_) => None,
        }
    }

    #[must_use]
    pub fn as_status(&self) -> Option<&StatusReply> {
        match self {
            Self::Status(status) => Some(status),
            Self::Counts(_) => None,
        }
    }
}

/// Running totals of detected vehicles.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct DetectionCounts {
    /// Count per detected class (e.g. `Car`, `Bus`, `Truck`)
    #[builder(default)]
    pub class_counters: BTreeMap<String, u64>,
    /// Buses and trucks
    pub heavy_vehicles: u64,
    /// Cars, motorcycles and vans
    pub light_vehicles: u64,
}

impl DetectionCounts {
    /// Count for one class, zero if the class was never reported.
    #[must_use]
    pub fn class(&self, name: &str) -> u64 {
        self.class_counters.get(name).copied().unwrap_or_default()
    }

    /// Sum over every class.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.class_counters.values().sum()
    }
}

/// Keep-alive acknowledgement, e.g. `{"status": "connected", "message": "WebSocket is active"}`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
pub struct StatusReply {
    #[builder(into)]
    pub status: String,
    #[builder(into)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frame_should_deserialize() {
        let json = r#"{
            "classCounters": {"Bus": 2, "Car": 10, "Motorcycle": 1, "Truck": 3, "Van": 4},
            "heavyVehicles": 5,
            "lightVehicles": 15
        }"#;

        let frame: StatsFrame = serde_json::from_str(json).unwrap();
        let counts = frame.as_counts().expect("expected counts");

        assert_eq!(counts.heavy_vehicles, 5);
        assert_eq!(counts.light_vehicles, 15);
        assert_eq!(counts.class("Car"), 10);
        assert_eq!(counts.class("Bicycle"), 0);
        assert_eq!(counts.total(), 20);
        assert!(frame.as_status().is_none());
    }

    #[test]
    fn status_frame_should_deserialize() {
        let json = r#"{"status": "connected", "message": "WebSocket is active"}"#;

        let frame: StatsFrame = serde_json::from_str(json).unwrap();

        assert_eq!(
            frame,
            StatsFrame::Status(
                StatusReply::builder()
                    .status("connected")
                    .message("WebSocket is active")
                    .build()
            )
        );
    }

    #[test]
    fn unrelated_frame_should_fail() {
        let result = serde_json::from_str::<StatsFrame>(r#"{"foo": 1}"#);

        assert!(result.is_err(), "unexpected success: {result:?}");
    }

    #[test]
    fn counts_serialize_with_wire_names() {
        let counts = DetectionCounts::builder()
            .class_counters(BTreeMap::from([("Bus".to_owned(), 1)]))
            .heavy_vehicles(1)
            .light_vehicles(0)
            .build();

        let value = serde_json::to_value(&counts).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "classCounters": {"Bus": 1},
                "heavyVehicles": 1,
                "lightVehicles": 0
            })
        );
    }
}
