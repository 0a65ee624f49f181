use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;

/// Alert severity. Variant order is priority order: `Extreme` is the most
/// urgent and compares smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Extreme,
    Severe,
    Moderate,
    Minor,
    Unknown,
}

impl Severity {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "extreme" => Severity::Extreme,
            "severe" => Severity::Severe,
            "moderate" => Severity::Moderate,
            "minor" => Severity::Minor,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Extreme => "Extreme",
            Severity::Severe => "Severe",
            Severity::Moderate => "Moderate",
            Severity::Minor => "Minor",
            Severity::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: String,
    pub event: String,
    pub severity: Severity,
    pub headline: String,
    // Kept from the feed for completeness; the push payload does not carry them.
    #[allow(dead_code)]
    pub description: String,
    #[allow(dead_code)]
    pub instruction: String,
    pub area_desc: String,
    #[allow(dead_code)]
    pub sender_name: String,
    pub effective: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

impl Alert {
    /// Delivery priority between two alerts for the same device.
    ///
    /// Severity first, then earliest effective time (missing sorts last),
    /// then identifier. `Ordering::Less` means `self` is delivered.
    pub fn priority_cmp(&self, other: &Alert) -> Ordering {
        self.severity
            .cmp(&other.severity)
            .then_with(|| match (self.effective, other.effective) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| self.id.cmp(&other.id))
    }

    pub fn body(&self) -> String {
        if self.headline.is_empty() {
            format!("{} for {}", self.event, self.area_desc)
        } else {
            self.headline.clone()
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires, Some(expires) if expires < now)
    }
}

#[cfg(test)]
pub(crate) fn test_alert(id: &str, severity: Severity) -> Alert {
    Alert {
        id: id.to_string(),
        event: format!("{} Warning", severity),
        severity,
        headline: String::new(),
        description: String::new(),
        instruction: String::new(),
        area_desc: "Los Angeles County".to_string(),
        sender_name: "NWS Los Angeles/Oxnard CA".to_string(),
        effective: None,
        expires: None,
    }
}
