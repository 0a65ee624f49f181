pub mod aggregator;
pub mod cycle;
pub mod dispatch;
pub mod prune;
pub mod registration;
pub mod resolver;

use std::sync::Arc;

use crate::alert_source::AlertSource;
use crate::config::CycleSettings;
use crate::db::{DedupStore, RegistrationStore};
use crate::push::PushTransport;

#[derive(Clone)]
pub struct AlertContext {
    pub registrations: Arc<dyn RegistrationStore>,
    pub sent_alerts: Arc<dyn DedupStore>,
    pub source: Arc<dyn AlertSource>,
    pub transport: Arc<dyn PushTransport>,
    pub settings: CycleSettings,
}
