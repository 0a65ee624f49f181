use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, alias = "displayName", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            name: None,
        }
    }

    fn validate(&self) -> Result<(), RegistrationError> {
        if !self.latitude.is_finite() || self.latitude.abs() > 90.0 {
            return Err(RegistrationError::InvalidArgument(format!(
                "latitude {} is out of range",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || self.longitude.abs() > 180.0 {
            return Err(RegistrationError::InvalidArgument(format!(
                "longitude {} is out of range",
                self.longitude
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRegistration {
    pub token: String,
    pub locations: Vec<Location>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a registration call. Older app builds send a single
/// `latitude`/`longitude` pair instead of `locations`.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, alias = "fcmToken")]
    pub token: Option<String>,
    #[serde(default)]
    pub locations: Option<Vec<Location>>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationUpdate {
    pub token: String,
    pub locations: Vec<Location>,
}

impl RegisterRequest {
    /// Resolves the legacy single-point shape into the `locations` form.
    /// `locations` wins whenever it is present, even when empty.
    pub fn normalize(self) -> Result<RegistrationUpdate, RegistrationError> {
        let token = match self.token.map(|t| t.trim().to_string()) {
            Some(t) if !t.is_empty() => t,
            _ => {
                return Err(RegistrationError::InvalidArgument(
                    "token is required".to_string(),
                ))
            }
        };

        let locations = match (self.locations, self.latitude, self.longitude) {
            (Some(locations), _, _) => locations,
            (None, Some(latitude), Some(longitude)) => vec![Location::new(latitude, longitude)],
            _ => {
                return Err(RegistrationError::InvalidArgument(
                    "locations, or latitude and longitude, are required".to_string(),
                ))
            }
        };

        for location in &locations {
            location.validate()?;
        }

        Ok(RegistrationUpdate { token, locations })
    }
}
