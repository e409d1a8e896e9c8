//! REST client for the forecasting service.
//!
//! Covers the request/response surface the dashboard needs: model listing
//! and loading, dataset listing, upload and loading, and prediction runs.

mod client;
mod error;
mod types;


pub use client::{
    validate_upload, ApiClient, ApiClientConfig, DEFAULT_API_BASE_URL, DEFAULT_REQUEST_TIMEOUT,
};
pub use error::ApiError;
pub use types::{
    Candle, DataFile, DataInfo, Device, LoadDataResponse, LoadModelResponse, ModelCatalog,
    ModelInfo, PredictionRequest, PredictionResponse, PriceRange, UploadResponse,
    ALLOWED_DATA_EXTENSIONS, MAX_UPLOAD_BYTES,
};
