pub const CREATE_ALERT_DEVICES: &str = r#"
CREATE TABLE IF NOT EXISTS alert_devices (
    token TEXT PRIMARY KEY,
    locations JSONB,
    latitude DOUBLE PRECISION,
    longitude DOUBLE PRECISION,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

pub const CREATE_ALERT_DEVICES_UPDATED_AT_IDX: &str = r#"
CREATE INDEX IF NOT EXISTS alert_devices_updated_at_idx ON alert_devices (updated_at);
"#;

pub const CREATE_SENT_ALERTS: &str = r#"
CREATE TABLE IF NOT EXISTS sent_alerts (
    geo_key TEXT PRIMARY KEY,
    alert_ids TEXT[] NOT NULL DEFAULT '{}',
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

pub const CREATE_SENT_ALERTS_UPDATED_AT_IDX: &str = r#"
CREATE INDEX IF NOT EXISTS sent_alerts_updated_at_idx ON sent_alerts (updated_at);
"#;

pub const SELECT_ALL_DEVICES: &str = r#"
SELECT token, locations, latitude, longitude, updated_at FROM alert_devices;
"#;

// Legacy single-point columns are cleared once a device writes the list form.
pub const UPSERT_DEVICE: &str = r#"
INSERT INTO alert_devices (token, locations, latitude, longitude, updated_at)
VALUES ($1, $2, NULL, NULL, $3)
ON CONFLICT (token) DO UPDATE
SET locations = EXCLUDED.locations,
    latitude = NULL,
    longitude = NULL,
    updated_at = EXCLUDED.updated_at;
"#;

pub const DELETE_DEVICES: &str = r#"
DELETE FROM alert_devices WHERE token = ANY($1);
"#;

pub const DELETE_DEVICES_UPDATED_BEFORE: &str = r#"
DELETE FROM alert_devices WHERE updated_at < $1;
"#;

pub const SELECT_SENT_ALERT_IDS: &str = r#"
SELECT alert_ids FROM sent_alerts WHERE geo_key = $1;
"#;

pub const UPSERT_SENT_ALERT_IDS: &str = r#"
INSERT INTO sent_alerts (geo_key, alert_ids, updated_at)
VALUES ($1, $2, $3)
ON CONFLICT (geo_key) DO UPDATE
SET alert_ids = ARRAY(
        SELECT DISTINCT unnest(sent_alerts.alert_ids || EXCLUDED.alert_ids)
    ),
    updated_at = EXCLUDED.updated_at;
"#;

pub const DELETE_SENT_ALERTS_UPDATED_BEFORE: &str = r#"
DELETE FROM sent_alerts WHERE updated_at < $1;
"#;
