use std::fmt;

/// Coordinates rounded to two decimals (~1.1 km), used to coalesce nearby
/// devices into one upstream query and to partition dedup state.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoKey {
    key: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Half-up rounding toward +inf, so -118.245 -> -118.24 and 34.045 -> 34.05.
fn round2(value: f64) -> f64 {
    // `+ 0.0` folds -0.0 into 0.0 so the rendered key never reads "-0".
    ((value * 100.0 + 0.5).floor() / 100.0) + 0.0
}

impl GeoKey {
    /// Returns `None` for non-finite coordinates.
    pub fn from_coordinates(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        let latitude = round2(latitude);
        let longitude = round2(longitude);
        Some(Self {
            key: format!("{},{}", latitude, longitude),
            latitude,
            longitude,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl Eq for GeoKey {}

impl std::hash::Hash for GeoKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for GeoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
