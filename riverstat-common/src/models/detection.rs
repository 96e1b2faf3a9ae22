//! Detection payloads and validated detection events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Axis-aligned bounding box reported by the detector
///
/// Units are whatever the vision pipeline uses; the aggregation engine never
/// interprets them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Detection as posted by the ingestion source (wire field names)
///
/// Every field is optional so that validation can report *why* a payload was
/// rejected instead of failing deserialization of the whole batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDetection {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub w: Option<f64>,
    pub h: Option<f64>,
    /// Detector confidence in (0, 1]
    pub score: Option<f64>,
    pub class_id: Option<u32>,
    pub class_name: Option<String>,
    /// Observation time; the ingest time is used when absent
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawDetection {
    /// Validate the payload and build an event with a fresh id
    ///
    /// `now` becomes the observation time when the payload carries none.
    pub fn into_event(self, now: DateTime<Utc>) -> Result<DetectionEvent> {
        let label = validate_label(self.class_name.as_deref())?;
        let confidence = validate_confidence(self.score)?;

        Ok(DetectionEvent {
            id: Uuid::new_v4(),
            class_label: label,
            class_id: self.class_id.unwrap_or(0),
            confidence,
            bbox: BoundingBox {
                x: self.x.unwrap_or(0.0),
                y: self.y.unwrap_or(0.0),
                w: self.w.unwrap_or(0.0),
                h: self.h.unwrap_or(0.0),
            },
            observed_at: self.timestamp.unwrap_or(now),
        })
    }
}

/// One observed object instance, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    pub id: Uuid,
    pub class_label: String,
    pub class_id: u32,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub observed_at: DateTime<Utc>,
}

impl DetectionEvent {
    /// Create a validated event with a fresh id and an empty bounding box
    pub fn new(
        class_label: impl Into<String>,
        confidence: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Self> {
        let class_label = class_label.into();
        let label = validate_label(Some(&class_label))?;
        let confidence = validate_confidence(Some(confidence))?;

        Ok(Self {
            id: Uuid::new_v4(),
            class_label: label,
            class_id: 0,
            confidence,
            bbox: BoundingBox::default(),
            observed_at,
        })
    }

    pub fn with_class_id(mut self, class_id: u32) -> Self {
        self.class_id = class_id;
        self
    }
}

fn validate_label(label: Option<&str>) -> Result<String> {
    match label.map(str::trim) {
        Some(l) if !l.is_empty() => Ok(l.to_string()),
        Some(_) => Err(Error::Validation("class label is empty".to_string())),
        None => Err(Error::Validation("class label is missing".to_string())),
    }
}

fn validate_confidence(score: Option<f64>) -> Result<f64> {
    let score = score.ok_or_else(|| Error::Validation("confidence is missing".to_string()))?;

    // NaN fails both comparisons, so it lands here too
    if !(score > 0.0 && score <= 1.0) {
        return Err(Error::Validation(format!(
            "confidence {} outside (0, 1]",
            score
        )));
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(class_name: Option<&str>, score: Option<f64>) -> RawDetection {
        RawDetection {
            x: Some(10.0),
            y: Some(20.0),
            w: Some(30.0),
            h: Some(40.0),
            score,
            class_id: Some(3),
            class_name: class_name.map(str::to_string),
            timestamp: None,
        }
    }

    #[test]
    fn test_valid_payload_uses_ingest_time_when_timestamp_missing() {
        let now = Utc::now();
        let event = raw(Some("PET"), Some(0.9)).into_event(now).unwrap();

        assert_eq!(event.class_label, "PET");
        assert_eq!(event.class_id, 3);
        assert_eq!(event.confidence, 0.9);
        assert_eq!(event.observed_at, now);
        assert_eq!(event.bbox, BoundingBox { x: 10.0, y: 20.0, w: 30.0, h: 40.0 });
    }

    #[test]
    fn test_supplied_timestamp_is_kept() {
        let observed = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut payload = raw(Some("HDPE"), Some(0.5));
        payload.timestamp = Some(observed);

        let event = payload.into_event(Utc::now()).unwrap();
        assert_eq!(event.observed_at, observed);
    }

    #[test]
    fn test_label_is_trimmed_and_blank_rejected() {
        let event = raw(Some("  PET "), Some(0.5)).into_event(Utc::now()).unwrap();
        assert_eq!(event.class_label, "PET");

        let err = raw(Some("   "), Some(0.5)).into_event(Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("empty")));

        let err = raw(None, Some(0.5)).into_event(Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("missing")));
    }

    #[test]
    fn test_confidence_bounds() {
        assert!(raw(Some("PET"), Some(1.0)).into_event(Utc::now()).is_ok());
        assert!(raw(Some("PET"), Some(0.0001)).into_event(Utc::now()).is_ok());

        for bad in [0.0, -0.2, 1.0001, f64::NAN, f64::INFINITY] {
            let err = raw(Some("PET"), Some(bad)).into_event(Utc::now()).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "score {} accepted", bad);
        }

        let err = raw(Some("PET"), None).into_event(Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("confidence is missing")));
    }

    #[test]
    fn test_missing_bbox_fields_default_to_zero() {
        let payload: RawDetection =
            serde_json::from_str(r#"{"score": 0.7, "class_name": "CAN"}"#).unwrap();
        let event = payload.into_event(Utc::now()).unwrap();
        assert_eq!(event.bbox, BoundingBox::default());
        assert_eq!(event.class_id, 0);
    }

    #[test]
    fn test_new_event_validates() {
        assert!(DetectionEvent::new("PET", 0.8, Utc::now()).is_ok());
        assert!(DetectionEvent::new("", 0.8, Utc::now()).is_err());
        assert!(DetectionEvent::new("PET", 1.5, Utc::now()).is_err());
    }
}
