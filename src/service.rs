use crate::{
    config::Questions,
    engine::{VqaEngine, VqaEngineState},
    error::ApiError,
    intake::{ImageUpload, UploadStore},
    model::VqaRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// The JSON envelope returned for every answered request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Answer {
    pub message: String,
}

/// The request-to-answer pipeline shared by all handlers.
pub struct VqaService {
    engine: VqaEngine,
    store: UploadStore,
    questions: Questions,
    answered: AtomicU64,
}

impl VqaService {
    pub fn new(engine: VqaEngine, store: UploadStore, questions: Questions) -> Self {
        Self {
            engine,
            store,
            questions,
            answered: AtomicU64::new(0),
        }
    }

    pub fn questions(&self) -> &Questions {
        &self.questions
    }

    pub fn engine_state(&self) -> VqaEngineState {
        self.engine.state()
    }

    /// Number of requests answered successfully so far.
    pub fn answered(&self) -> u64 {
        self.answered.load(Ordering::Relaxed)
    }

    /// Decodes the upload and asks the model the question about it.
    pub async fn answer(&self, upload: ImageUpload, question: String) -> Result<Answer, ApiError> {
        let store = self.store.clone();
        let image = tokio::task::spawn_blocking(move || store.decode(&upload)).await??;

        let response = self.engine.submit(VqaRequest { question, image }).await?;

        let message = response.answer.trim();
        if message.is_empty() {
            return Err(ApiError::EmptyAnswer);
        }

        self.answered.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "Answered #{} ({}x{}, {:?}) in {:?}: {:?}",
            response.id,
            response.request_metadata.width,
            response.request_metadata.height,
            response.request_metadata.question,
            response.duration,
            message
        );

        Ok(Answer {
            message: message.to_string(),
        })
    }
}
