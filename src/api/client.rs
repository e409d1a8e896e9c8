use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::api::types::{
    DataFile, Device, ErrorBody, LoadDataResponse, LoadModelResponse, ModelCatalog,
    PredictionRequest, PredictionResponse, UploadResponse, ALLOWED_DATA_EXTENSIONS,
    MAX_UPLOAD_BYTES,
};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    /// Sent as a bearer token when present.
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            token: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Request/response client for the forecasting service.
///
/// Every call resolves with a decoded result or fails with an [`ApiError`].
/// Nothing is retried here; retry policy belongs to the caller.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiError> {
        if config.base_url.trim().is_empty() {
            return Err(ApiError::Config("api base url cannot be empty".to_string()));
        }
        if config.timeout.is_zero() {
            return Err(ApiError::Config(
                "request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            token: config
                .token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
            client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|error| ApiError::Config(error.to_string()))?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- models --------------------------------------------------------------

    pub async fn list_models(&self) -> Result<ModelCatalog, ApiError> {
        self.execute(self.client.get(self.endpoint("/models")), "GET /models")
            .await
    }

    /// Load `model_key` on `device`. The device name is not checked locally.
    pub async fn load_model(
        &self,
        model_key: &str,
        device: &Device,
    ) -> Result<LoadModelResponse, ApiError> {
        if model_key.trim().is_empty() {
            return Err(ApiError::Validation("model key cannot be empty".to_string()));
        }
        let request = self
            .client
            .post(self.endpoint("/models/load"))
            .query(&[("model_key", model_key), ("device", device.as_str())]);
        self.execute(request, "POST /models/load").await
    }

    // -- datasets ------------------------------------------------------------

    pub async fn list_data_files(&self) -> Result<Vec<DataFile>, ApiError> {
        self.execute(self.client.get(self.endpoint("/data/files")), "GET /data/files")
            .await
    }

    /// Upload a dataset file. The extension and size are checked before any
    /// bytes are sent.
    pub async fn upload_data(
        &self,
        filename: &str,
        contents: Vec<u8>,
    ) -> Result<UploadResponse, ApiError> {
        validate_upload(filename, contents.len())?;

        let part = Part::bytes(contents)
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))
            .map_err(|error| ApiError::Validation(error.to_string()))?;
        let form = Form::new().part("file", part);
        let request = self
            .client
            .post(self.endpoint("/data/upload"))
            .multipart(form);
        self.execute(request, "POST /data/upload").await
    }

    /// Load a dataset that already exists on the server.
    pub async fn load_data(&self, file_path: &str) -> Result<LoadDataResponse, ApiError> {
        if file_path.trim().is_empty() {
            return Err(ApiError::Validation("file path cannot be empty".to_string()));
        }
        let request = self
            .client
            .post(self.endpoint("/data/load"))
            .query(&[("file_path", file_path)]);
        self.execute(request, "POST /data/load").await
    }

    // -- predictions ---------------------------------------------------------

    pub async fn predict(
        &self,
        params: &PredictionRequest,
    ) -> Result<PredictionResponse, ApiError> {
        params.validate().map_err(ApiError::Validation)?;
        let request = self.client.post(self.endpoint("/predict")).json(params);
        self.execute(request, "POST /predict").await
    }

    // -- plumbing ------------------------------------------------------------

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        label: &str,
    ) -> Result<T, ApiError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        debug!("{label}");
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            warn!("{label} rejected as unauthorized");
            return Err(ApiError::Unauthorized(error_detail(&body)));
        }
        if !status.is_success() {
            let message = error_detail(&body);
            warn!("{label} returned status {}: {message}", status.as_u16());
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|error| {
            ApiError::InvalidResponse(format!("failed to parse {label} response: {error}"))
        })
    }
}

/// Check an upload against the server's accepted extensions and size limit.
pub fn validate_upload(filename: &str, size: usize) -> Result<(), ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    if !ALLOWED_DATA_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::Validation(format!(
            "unsupported file type '{filename}'; expected one of {}",
            ALLOWED_DATA_EXTENSIONS.join(", ")
        )));
    }
    if size == 0 {
        return Err(ApiError::Validation(format!("'{filename}' is empty")));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(ApiError::Validation(format!(
            "'{filename}' is {size} bytes; the limit is {MAX_UPLOAD_BYTES}"
        )));
    }
    Ok(())
}

fn mime_for(filename: &str) -> &'static str {
    if filename.to_ascii_lowercase().ends_with(".csv") {
        "text/csv"
    } else {
        "application/octet-stream"
    }
}

/// Pull a human-readable message out of an error body.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
