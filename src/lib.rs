//! DigitalEye answers questions about uploaded images with a pretrained
//! visual-question-answering model behind a small HTTP API.

pub mod config;
pub mod engine;
pub mod error;
pub mod intake;
pub mod model;
pub mod paligemma;
pub mod server;
pub mod service;

pub use config::{Questions, ServerConfig};
pub use engine::{EngineError, VqaEngine, VqaEngineResponse, VqaEngineState};
pub use error::ApiError;
pub use intake::{ImageUpload, IntakeError, UploadForm, UploadStore};
pub use model::{RgbImage, VqaModel, VqaRequest, VqaResponse};
pub use paligemma::PaligemmaModel;
pub use server::{router, serve};
pub use service::{Answer, VqaService};
