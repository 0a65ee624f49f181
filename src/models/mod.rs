pub mod alert;
pub mod geo_key;
pub mod registration;

pub use alert::{Alert, Severity};
pub use geo_key::GeoKey;
pub use registration::{DeviceRegistration, Location, RegisterRequest};
