use crate::model_service::InferenceError;
use crate::server::SharedState;
use axum::extract::{multipart::MultipartError, Multipart, State};
use axum::Json;
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

/// Multipart field the client uploads the image under.
const FILE_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no `file` field in the upload")]
    MissingFile,
    #[error("could not read upload: {0}")]
    Read(#[from] MultipartError),
}

#[derive(Error, Debug)]
enum PredictError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Exactly one of the two keys, always under a 200. The frontend decides
/// which case it got by probing for `error`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Scored { percentage_morphed: f64 },
    Failed { error: String },
}

/// Converts the model's "genuine" probability into the morphed percentage
/// the API reports, rounded to two decimals.
fn morph_percentage(real_probability: f32) -> f64 {
    let morphed = (1.0 - f64::from(real_probability)) * 100.0;
    (morphed * 100.0).round() / 100.0
}

async fn read_upload(multipart: &mut Multipart) -> Result<Vec<u8>, UploadError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(UploadError::MissingFile)
}

async fn score_upload(
    state: &SharedState,
    multipart: &mut Multipart,
) -> Result<f64, PredictError> {
    let image = read_upload(multipart).await?;
    let probability = state.model.score(&image)?;
    Ok(morph_percentage(probability))
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Json<PredictResponse> {
    let started = Instant::now();

    let response = match score_upload(&state, &mut multipart).await {
        Ok(percentage_morphed) => PredictResponse::Scored { percentage_morphed },
        Err(e) => {
            tracing::warn!("Prediction failed: {e}");
            PredictResponse::Failed {
                error: e.to_string(),
            }
        }
    };

    let outcome = match &response {
        PredictResponse::Scored { .. } => "scored",
        PredictResponse::Failed { .. } => "error",
    };
    state
        .metrics
        .record_prediction(outcome, started.elapsed().as_millis() as u64);

    Json(response)
}
