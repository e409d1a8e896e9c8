//! Dashboard session: the state a forecasting front end keeps between calls.
//!
//! A session pairs the REST client with the push channel. It caches the
//! model catalog and dataset listing, remembers which model and dataset are
//! active, and accumulates prediction results from both sources (explicit
//! `predict` calls and `prediction_update` pushes) in arrival order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{
    ApiClient, ApiError, DataFile, DataInfo, Device, LoadDataResponse, LoadModelResponse,
    ModelCatalog, PredictionRequest, PredictionResponse, UploadResponse,
};
use crate::channel::event_types::EVENT_PREDICTION_UPDATE;
use crate::channel::{listener, ChannelError, EventChannel, Listener};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no model is loaded")]
    ModelNotLoaded,
    #[error("no dataset is loaded")]
    DataNotLoaded,
    #[error("{0}")]
    Validation(String),
    #[error("server reported failure for {0}")]
    Rejected(&'static str),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Where a prediction entry came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PredictionSource {
    Requested { response: PredictionResponse },
    Pushed { payload: serde_json::Value },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub source: PredictionSource,
}

#[derive(Debug, Default)]
struct SessionState {
    catalog: ModelCatalog,
    data_files: Vec<DataFile>,
    current_model: Option<String>,
    current_data: Option<DataInfo>,
    last_error: Option<String>,
}

pub struct DashboardSession {
    client: ApiClient,
    channel: Arc<EventChannel>,
    state: Mutex<SessionState>,
    predictions: Arc<Mutex<Vec<PredictionRecord>>>,
    subscription: Mutex<Option<Listener>>,
    in_flight: AtomicUsize,
}

/// Counts an operation as in flight until dropped.
struct Busy<'a>(&'a AtomicUsize);

impl<'a> Busy<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DashboardSession {
    pub fn new(client: ApiClient, channel: Arc<EventChannel>) -> Self {
        Self {
            client,
            channel,
            state: Mutex::new(SessionState::default()),
            predictions: Arc::new(Mutex::new(Vec::new())),
            subscription: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn channel(&self) -> &Arc<EventChannel> {
        &self.channel
    }

    /// Subscribe to pushed prediction updates and connect the channel.
    /// Calling it again while subscribed only re-issues the connect.
    pub fn start(&self, ws_url: &str) -> Result<(), SessionError> {
        {
            let mut subscription = lock(&self.subscription);
            if subscription.is_none() {
                let predictions = self.predictions.clone();
                let handle = listener(move |event| {
                    if let Some(payload) = event.payload() {
                        lock(&predictions).push(PredictionRecord {
                            received_at: Utc::now(),
                            source: PredictionSource::Pushed {
                                payload: payload.clone(),
                            },
                        });
                    }
                });
                self.channel.on(EVENT_PREDICTION_UPDATE, handle.clone());
                *subscription = Some(handle);
            }
        }
        info!("starting dashboard session against {ws_url}");
        self.channel.connect(ws_url)?;
        Ok(())
    }

    /// Unsubscribe from pushed updates and close the channel.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let handle = lock(&self.subscription).take();
        if let Some(handle) = handle {
            self.channel.off(EVENT_PREDICTION_UPDATE, &handle);
        }
        self.channel.disconnect().await?;
        Ok(())
    }

    pub async fn refresh_models(&self) -> Result<ModelCatalog, SessionError> {
        let _busy = Busy::enter(&self.in_flight);
        let catalog = self.track(self.client.list_models().await)?;
        let mut state = lock(&self.state);
        state.current_model = catalog.current.clone();
        state.catalog = catalog.clone();
        debug!("model catalog refreshed: {} models", catalog.models.len());
        Ok(catalog)
    }

    pub async fn refresh_data_files(&self) -> Result<Vec<DataFile>, SessionError> {
        let _busy = Busy::enter(&self.in_flight);
        let files = self.track(self.client.list_data_files().await)?;
        lock(&self.state).data_files = files.clone();
        Ok(files)
    }

    pub async fn load_model(
        &self,
        model_key: &str,
        device: &Device,
    ) -> Result<LoadModelResponse, SessionError> {
        let _busy = Busy::enter(&self.in_flight);
        self.clear_error();
        let response = self.track(self.client.load_model(model_key, device).await)?;
        if !response.success {
            return Err(self.fail(SessionError::Rejected("model load")));
        }
        info!("model {model_key} loaded on {}", response.device);
        lock(&self.state).current_model = Some(model_key.to_string());
        Ok(response)
    }

    /// Upload a dataset, make it current, then refresh the file listing.
    pub async fn upload_data(
        &self,
        filename: &str,
        contents: Vec<u8>,
    ) -> Result<UploadResponse, SessionError> {
        let _busy = Busy::enter(&self.in_flight);
        self.clear_error();
        let response = self.track(self.client.upload_data(filename, contents).await)?;
        if !response.success {
            return Err(self.fail(SessionError::Rejected("upload")));
        }
        lock(&self.state).current_data = Some(response.info.clone());

        if let Err(e) = self.refresh_data_files().await {
            warn!("dataset uploaded but file list refresh failed: {e}");
        }
        Ok(response)
    }

    pub async fn load_data(&self, file_path: &str) -> Result<LoadDataResponse, SessionError> {
        let _busy = Busy::enter(&self.in_flight);
        self.clear_error();
        let response = self.track(self.client.load_data(file_path).await)?;
        if !response.success {
            return Err(self.fail(SessionError::Rejected("data load")));
        }
        lock(&self.state).current_data = Some(response.info.clone());
        Ok(response)
    }

    /// Run a prediction. Requires a loaded model and dataset; neither is
    /// checked against the server, only against what this session has seen.
    pub async fn predict(
        &self,
        params: &PredictionRequest,
    ) -> Result<PredictionResponse, SessionError> {
        let _busy = Busy::enter(&self.in_flight);
        self.clear_error();
        {
            let state = lock(&self.state);
            if state.current_model.is_none() {
                drop(state);
                return Err(self.fail(SessionError::ModelNotLoaded));
            }
            if state.current_data.is_none() {
                drop(state);
                return Err(self.fail(SessionError::DataNotLoaded));
            }
        }
        if let Err(reason) = params.validate() {
            return Err(self.fail(SessionError::Validation(reason)));
        }

        let response = self.track(self.client.predict(params).await)?;
        if !response.success {
            return Err(self.fail(SessionError::Rejected("prediction")));
        }
        lock(&self.predictions).push(PredictionRecord {
            received_at: Utc::now(),
            source: PredictionSource::Requested {
                response: response.clone(),
            },
        });
        Ok(response)
    }

    pub fn can_predict(&self) -> bool {
        let state = lock(&self.state);
        state.current_model.is_some() && state.current_data.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn catalog(&self) -> ModelCatalog {
        lock(&self.state).catalog.clone()
    }

    pub fn data_files(&self) -> Vec<DataFile> {
        lock(&self.state).data_files.clone()
    }

    pub fn current_model(&self) -> Option<String> {
        lock(&self.state).current_model.clone()
    }

    pub fn current_data(&self) -> Option<DataInfo> {
        lock(&self.state).current_data.clone()
    }

    /// Message of the most recent failed operation, if the latest
    /// operation failed.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.state).last_error.clone()
    }

    pub fn predictions(&self) -> Vec<PredictionRecord> {
        lock(&self.predictions).clone()
    }

    fn clear_error(&self) {
        lock(&self.state).last_error = None;
    }

    fn fail(&self, error: SessionError) -> SessionError {
        warn!("dashboard operation failed: {error}");
        lock(&self.state).last_error = Some(error.to_string());
        error
    }

    fn track<T>(&self, result: Result<T, ApiError>) -> Result<T, SessionError> {
        result.map_err(|e| self.fail(e.into()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
