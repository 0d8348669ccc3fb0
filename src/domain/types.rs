//! Shared wire and value types for the load generator

use serde::{Deserialize, Serialize};

/// One synthetic sensor reading as delivered to the ingestion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub value: f64,
    pub sensor_type: String,
    pub id1: String,
    pub id2: i32,
    /// Wall-clock timestamp (epoch ms) taken when the call is issued
    pub timestamp_ms: i64,
}

/// Acknowledgement returned by a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

/// Payload fields carried by every emitted reading
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub value: f64,
    pub sensor_type: String,
    pub id1: String,
    pub id2: i32,
}

impl Default for Payload {
    fn default() -> Self {
        Self { value: 10.0, sensor_type: "TEMP".to_string(), id1: "ABCDEFGH".to_string(), id2: 1 }
    }
}

impl Payload {
    /// Stamp the payload with the current wall-clock time
    pub fn to_reading(&self) -> Reading {
        Reading {
            value: self.value,
            sensor_type: self.sensor_type.clone(),
            id1: self.id1.clone(),
            id2: self.id2,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Response envelope shared by every control API route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    pub error: bool,
    pub message: String,
}

impl<T> Envelope<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self { data: Some(data), error: false, message: message.into() }
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self { data: None, error: false, message: message.into() }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self { data: None, error: true, message: message.into() }
    }
}

/// Partial payload update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id2: Option<i32>,
}

impl ConfigUpdate {
    /// Apply present fields onto `payload`. Empty strings count as absent.
    pub fn apply_to(&self, payload: &mut Payload) {
        if let Some(value) = self.value {
            payload.value = value;
        }
        if let Some(sensor_type) = self.sensor_type.as_deref().filter(|s| !s.is_empty()) {
            payload.sensor_type = sensor_type.to_string();
        }
        if let Some(id1) = self.id1.as_deref().filter(|s| !s.is_empty()) {
            payload.id1 = id1.to_string();
        }
        if let Some(id2) = self.id2 {
            payload.id2 = id2;
        }
    }
}

/// Body of `POST /frequency`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyRequest {
    /// Emission period as a duration string ("500ms", "2s")
    pub timeout: String,
}

/// Body of `POST /spam`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BurstRequest {
    pub total: i64,
    pub concurrency: i64,
    #[serde(default)]
    pub timeout: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default, rename = "type")]
    pub sensor_type: String,
    #[serde(default)]
    pub id1: String,
    #[serde(default)]
    pub id2: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_wire_format() {
        let reading = Reading {
            value: 23.5,
            sensor_type: "TEMP".to_string(),
            id1: "ABCDEFGH".to_string(),
            id2: 7,
            timestamp_ms: 1_724_550_000_000,
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["sensorType"], "TEMP");
        assert_eq!(json["timestampMs"], 1_724_550_000_000i64);
        assert_eq!(json["id2"], 7);
    }

    #[test]
    fn test_config_update_absent_fields_unchanged() {
        let mut payload = Payload::default();
        let update: ConfigUpdate = serde_json::from_str(r#"{"type":"HUMIDITY"}"#).unwrap();
        update.apply_to(&mut payload);

        assert_eq!(payload.sensor_type, "HUMIDITY");
        assert_eq!(payload.value, 10.0);
        assert_eq!(payload.id1, "ABCDEFGH");
        assert_eq!(payload.id2, 1);
    }

    #[test]
    fn test_config_update_explicit_zero_applies() {
        let mut payload = Payload::default();
        let update: ConfigUpdate = serde_json::from_str(r#"{"value":0.0,"id2":0}"#).unwrap();
        update.apply_to(&mut payload);

        assert_eq!(payload.value, 0.0);
        assert_eq!(payload.id2, 0);
    }

    #[test]
    fn test_config_update_empty_string_ignored() {
        let mut payload = Payload::default();
        let update = ConfigUpdate {
            sensor_type: Some(String::new()),
            id1: Some(String::new()),
            ..Default::default()
        };
        update.apply_to(&mut payload);

        assert_eq!(payload, Payload::default());
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = serde_json::to_value(Envelope::ok(3u32, "done")).unwrap();
        assert_eq!(ok["data"], 3);
        assert_eq!(ok["error"], false);

        let fail = serde_json::to_value(Envelope::<()>::fail("already running")).unwrap();
        assert!(fail["data"].is_null());
        assert_eq!(fail["error"], true);
        assert_eq!(fail["message"], "already running");
    }
}
