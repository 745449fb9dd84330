//! Telemetry samples attached to recorded video.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Vehicle state at one instant of a clip.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub position: Option<GeoPosition>,

    /// Heading in degrees clockwise from north.
    pub heading_deg: Option<f64>,

    /// Speed in meters per second.
    pub speed_mps: Option<f64>,

    /// Extra labelled values (gear, autopilot state, ...), displayed verbatim.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

const CARDINALS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

impl TelemetrySample {
    pub fn speed_kmh(&self) -> Option<f64> {
        self.speed_mps.map(|mps| mps * 3.6)
    }

    /// Eight-point compass direction for the heading.
    pub fn cardinal(&self) -> Option<&'static str> {
        let heading = self.heading_deg?.rem_euclid(360.0);
        let sector = ((heading + 22.5) / 45.0).floor() as usize % CARDINALS.len();
        Some(CARDINALS[sector])
    }

    /// Single-line HUD text, e.g. `"72 km/h  NE 41°  gear D"`.
    pub fn hud_line(&self) -> String {
        let mut parts = Vec::new();
        if let Some(kmh) = self.speed_kmh() {
            parts.push(format!("{:.0} km/h", kmh));
        }
        if let (Some(cardinal), Some(heading)) = (self.cardinal(), self.heading_deg) {
            parts.push(format!("{cardinal} {:.0}°", heading.rem_euclid(360.0)));
        }
        for (key, value) in &self.extra {
            parts.push(format!("{key} {value}"));
        }
        parts.join("  ")
    }
}
