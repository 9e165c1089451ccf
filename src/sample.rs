use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single position fix, stamped when it reaches the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub received_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::at(latitude, longitude, Utc::now())
    }

    pub fn at(latitude: f64, longitude: f64, received_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            received_at,
        }
    }
}

/// Formats as `"<lat>, <lon>"`, the line shown in the location log
impl fmt::Display for LocationSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}",
            format_coordinate(self.latitude),
            format_coordinate(self.longitude)
        )
    }
}

/// Render a coordinate the way the JVM prints a double: always a fractional
/// digit, scientific `E` notation outside `[1e-3, 1e7)`
pub fn format_coordinate(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = value.abs();
    if value == 0.0 || (1e-3..1e7).contains(&magnitude) {
        let plain = value.to_string();
        return if plain.contains('.') {
            plain
        } else {
            format!("{}.0", plain)
        };
    }

    let sci = format!("{:e}", value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    if mantissa.contains('.') {
        format!("{}E{}", mantissa, exponent)
    } else {
        format!("{}.0E{}", mantissa, exponent)
    }
}

/// One delivery from the platform feed, oldest fix first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationBatch {
    pub fixes: Vec<LocationSample>,
}

impl LocationBatch {
    pub fn new(fixes: Vec<LocationSample>) -> Self {
        Self { fixes }
    }

    /// Build a batch from raw coordinate pairs, all stamped now
    pub fn from_coords(coords: &[(f64, f64)]) -> Self {
        let now = Utc::now();
        Self {
            fixes: coords
                .iter()
                .map(|&(lat, lon)| LocationSample::at(lat, lon, now))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    /// Most recent fix; older fixes in the batch are discarded by the session
    pub fn latest(&self) -> Option<&LocationSample> {
        self.fixes.last()
    }

    pub fn into_latest(self) -> Option<LocationSample> {
        self.fixes.into_iter().last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_shortest_float_form() {
        let sample = LocationSample::new(-6.200000, 106.816666);
        assert_eq!(sample.to_string(), "-6.2, 106.816666");
    }

    #[test]
    fn test_display_keeps_fraction_for_whole_numbers() {
        assert_eq!(LocationSample::new(51.0, 0.0).to_string(), "51.0, 0.0");
        assert_eq!(LocationSample::new(-33.0, -0.0).to_string(), "-33.0, -0.0");
    }

    #[test]
    fn test_display_uses_exponent_outside_plain_range() {
        assert_eq!(LocationSample::new(0.00005, -0.0).to_string(), "5.0E-5, -0.0");
        assert_eq!(format_coordinate(0.001), "0.001");
        assert_eq!(format_coordinate(0.000123), "1.23E-4");
        assert_eq!(format_coordinate(12_345_678.0), "1.2345678E7");
        assert_eq!(format_coordinate(-1e7), "-1.0E7");
        assert_eq!(format_coordinate(9_999_999.5), "9999999.5");
        assert_eq!(format_coordinate(f64::NAN), "NaN");
    }

    #[test]
    fn test_latest_is_last_fix() {
        let batch = LocationBatch::from_coords(&[(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)]);
        assert_eq!(batch.len(), 3);

        let latest = batch.latest().unwrap();
        assert_eq!(latest.latitude, 5.0);
        assert_eq!(latest.longitude, 6.0);
    }

    #[test]
    fn test_empty_batch_has_no_latest() {
        let batch = LocationBatch::default();
        assert!(batch.is_empty());
        assert!(batch.latest().is_none());
        assert!(batch.into_latest().is_none());
    }
}
