use kornia_image::{Image, allocator::CpuAllocator};

/// 8-bit RGB raster handed to the model.
pub type RgbImage = Image<u8, 3, CpuAllocator>;

/// A single question about a single image.
pub struct VqaRequest {
    pub question: String,
    pub image: RgbImage,
}

impl VqaRequest {
    /// Extracts the lightweight part of the request without cloning the pixels.
    pub fn metadata(&self) -> RequestMetadata {
        let size = self.image.size();
        RequestMetadata {
            question: self.question.clone(),
            width: size.width,
            height: size.height,
        }
    }
}

/// Telemetry kept alongside an inference for logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestMetadata {
    pub question: String,
    pub width: usize,
    pub height: usize,
}

pub struct VqaResponse {
    pub answer: String,
}

/// Trait for visual-question-answering models that can be driven by the `VqaEngine`.
///
/// The engine moves the model onto its own worker thread, so `run` may take
/// `&mut self` and keep whatever generation state it needs between calls.
pub trait VqaModel {
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Answers the question about the image.
    fn run(&mut self, request: VqaRequest) -> Result<VqaResponse, Self::Error>;
}
