use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

pub const WEBP_MIME: &str = "image/webp";

/// Raw camera capture handed to the compressor.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub data: Vec<u8>,
    pub mime: String,
}

impl RawImage {
    pub fn new(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            data,
            mime: mime.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncodedPhoto {
    pub filename: String,
    pub mime: String,
    /// Base64 (standard alphabet) of the encoded bytes.
    pub data: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub byte_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub unit_id: String,
    pub index: usize,
    pub total: usize,
    pub photos: Vec<EncodedPhoto>,
}

impl Batch {
    pub fn caption_prefix(&self) -> String {
        format!("({}/{}) {}", self.index, self.total, self.unit_id)
    }

    /// Caption for the photo at 1-based `position` inside this batch.
    pub fn caption(&self, position: usize) -> String {
        format!("{} #{}", self.caption_prefix(), position)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Unit {
    pub truck: String,
    pub trailer: String,
}

impl Unit {
    pub fn unit_id(&self) -> String {
        format!("{}/{}", self.truck, self.trailer)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimeInfo {
    pub human: String,
    pub iso: String,
    pub tz: String,
}

impl TimeInfo {
    pub fn from_datetime(at: DateTime<FixedOffset>, tz: &str) -> Self {
        Self {
            human: format!("{} {}", at.format("%Y-%m-%d %H:%M:%S"), tz),
            iso: at.with_timezone(&chrono::Utc).to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            tz: tz.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMethod {
    Geolocation,
    Manual,
    None,
}

impl AcquisitionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMethod::Geolocation => "geolocation",
            AcquisitionMethod::Manual => "manual",
            AcquisitionMethod::None => "none",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// Accuracy radius in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<AcquisitionMethod>,
}

impl Location {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PhotoTally {
    pub files: usize,
    pub albums: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub driver: Driver,
    pub unit: Unit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub time: TimeInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition_method: Option<AcquisitionMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photos: Option<PhotoTally>,
}

impl SubmissionSummary {
    /// Top-level method wins over the one nested in `location`.
    pub fn acquisition_method(&self) -> AcquisitionMethod {
        self.acquisition_method
            .or_else(|| self.location.as_ref().and_then(|l| l.method))
            .unwrap_or(AcquisitionMethod::None)
    }
}

/// Wire body of `POST /relay/group`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupPayload {
    pub unit: Unit,
    pub index: usize,
    pub total: usize,
    pub media: Vec<EncodedPhoto>,
}

impl GroupPayload {
    pub fn from_batch(unit: &Unit, batch: &Batch) -> Self {
        Self {
            unit: unit.clone(),
            index: batch.index,
            total: batch.total,
            media: batch.photos.clone(),
        }
    }

    pub fn into_batch(self) -> Batch {
        Batch {
            unit_id: self.unit.unit_id(),
            index: self.index,
            total: self.total,
            photos: self.media,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub batch_index: usize,
    pub attempts: u32,
    /// The messaging API's `result` field.
    pub result: serde_json::Value,
}
