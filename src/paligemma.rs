use crate::model::{VqaModel, VqaRequest, VqaResponse};
use kornia_vlm::paligemma::{Paligemma, PaligemmaConfig, PaligemmaError};

// PaliGemma from kornia-vlm answering questions about images
pub struct PaligemmaModel {
    model: Paligemma,
    sample_len: usize,
}

impl PaligemmaModel {
    /// Loads the pretrained checkpoint. Slow: downloads weights on first use.
    pub fn new(sample_len: usize) -> Result<Self, PaligemmaError> {
        let model = Paligemma::new(PaligemmaConfig::default())?;
        Ok(Self { model, sample_len })
    }
}

impl VqaModel for PaligemmaModel {
    type Error = PaligemmaError;

    fn run(&mut self, request: VqaRequest) -> Result<VqaResponse, Self::Error> {
        let answer =
            self.model
                .inference(&request.image, &request.question, self.sample_len, false)?;

        Ok(VqaResponse { answer })
    }
}
