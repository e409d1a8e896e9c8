use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

/// Execution device for a model. Unknown names are passed through to the
/// server untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
    Mps,
    Other(String),
}

impl Device {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Mps => "mps",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Device {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "cpu" | "" => Self::Cpu,
            "cuda" => Self::Cuda,
            "mps" => Self::Mps,
            _ => Self::Other(value.trim().to_string()),
        })
    }
}

impl Serialize for Device {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Device {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub tokenizer_id: Option<String>,
    #[serde(default)]
    pub context_length: Option<u32>,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelCatalog {
    #[serde(default)]
    pub models: BTreeMap<String, ModelInfo>,
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadModelResponse {
    pub success: bool,
    pub model: String,
    #[serde(default)]
    pub device: Device,
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

/// Upload extensions the server can ingest.
pub const ALLOWED_DATA_EXTENSIONS: &[&str] = &[".csv", ".feather", ".parquet"];

/// Largest upload the server accepts (100 MiB).
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub name: String,
    pub path: String,
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub modified: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataInfo {
    pub rows: u64,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub timeframe: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    pub info: DataInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadDataResponse {
    pub success: bool,
    pub info: DataInfo,
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

pub const DEFAULT_LOOKBACK: u32 = 400;
pub const DEFAULT_PRED_LEN: u32 = 120;
pub const DEFAULT_TEMPERATURE: f64 = 1.0;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_SAMPLE_COUNT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub lookback: u32,
    pub pred_len: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub sample_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
}

impl Default for PredictionRequest {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
            pred_len: DEFAULT_PRED_LEN,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            sample_count: DEFAULT_SAMPLE_COUNT,
            start_date: None,
        }
    }
}

impl PredictionRequest {
    /// Check the parameters against the ranges the dashboard exposes.
    pub fn validate(&self) -> Result<(), String> {
        if !(100..=1000).contains(&self.lookback) {
            return Err(format!("lookback must be 100..=1000, got {}", self.lookback));
        }
        if !(10..=500).contains(&self.pred_len) {
            return Err(format!("pred_len must be 10..=500, got {}", self.pred_len));
        }
        if !(0.1..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be 0.1..=2.0, got {}",
                self.temperature
            ));
        }
        if !(0.1..=1.0).contains(&self.top_p) {
            return Err(format!("top_p must be 0.1..=1.0, got {}", self.top_p));
        }
        if !(1..=5).contains(&self.sample_count) {
            return Err(format!(
                "sample_count must be 1..=5, got {}",
                self.sample_count
            ));
        }
        Ok(())
    }
}

/// One predicted (or historical) candlestick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<String>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub success: bool,
    #[serde(default)]
    pub predictions: Vec<Candle>,
    /// Error metrics against actual data when available (`mae`, `rmse`, `mape`).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub chart_data: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Shape of FastAPI-style error bodies.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_round_trips_known_and_unknown_names() {
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda);
        assert_eq!("".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!(
            "rocm".parse::<Device>().unwrap(),
            Device::Other("rocm".to_string())
        );
        assert_eq!(serde_json::to_value(Device::Mps).unwrap(), json!("mps"));
        assert_eq!(
            serde_json::from_value::<Device>(json!("xpu")).unwrap(),
            Device::Other("xpu".to_string())
        );
    }

    #[test]
    fn prediction_request_defaults_are_valid() {
        let request = PredictionRequest::default();
        assert_eq!(request.lookback, 400);
        assert_eq!(request.pred_len, 120);
        assert!(request.validate().is_ok());
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("start_date").is_none());
    }

    #[test]
    fn prediction_request_rejects_out_of_range_values() {
        let mut request = PredictionRequest {
            temperature: 2.5,
            ..Default::default()
        };
        assert!(request.validate().unwrap_err().contains("temperature"));

        request.temperature = 1.0;
        request.sample_count = 6;
        assert!(request.validate().unwrap_err().contains("sample_count"));

        request.sample_count = 1;
        request.lookback = 50;
        assert!(request.validate().unwrap_err().contains("lookback"));
    }

    #[test]
    fn data_info_tolerates_missing_optional_fields() {
        let info: DataInfo = serde_json::from_value(json!({ "rows": 10 })).unwrap();
        assert_eq!(info.rows, 10);
        assert!(info.columns.is_empty());
        assert!(info.price_range.is_none());
    }
}
