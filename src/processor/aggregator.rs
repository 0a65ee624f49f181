use std::collections::{BTreeSet, HashMap};

use crate::models::{DeviceRegistration, GeoKey};

/// Devices sharing one rounded location. `tokens` is a set: a device with
/// two locations in the same cell is listed once.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationGroup {
    pub latitude: f64,
    pub longitude: f64,
    pub tokens: BTreeSet<String>,
}

pub fn group_by_geo_key(registrations: &[DeviceRegistration]) -> HashMap<GeoKey, LocationGroup> {
    let mut groups: HashMap<GeoKey, LocationGroup> = HashMap::new();

    for registration in registrations {
        for location in &registration.locations {
            let Some(key) = GeoKey::from_coordinates(location.latitude, location.longitude) else {
                continue;
            };
            groups
                .entry(key.clone())
                .or_insert_with(|| LocationGroup {
                    latitude: key.latitude,
                    longitude: key.longitude,
                    tokens: BTreeSet::new(),
                })
                .tokens
                .insert(registration.token.clone());
        }
    }

    groups
}
