use std::path::PathBuf;

// defaults for the server
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_SAMPLE_LEN: usize = 50;
pub const DEFAULT_QUESTION: &str = "what is in the picture?";
pub const DEFAULT_CAPTION_PROMPT: &str = "the photograph of";

/// The questions asked when the client does not supply one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Questions {
    /// Used by `/send_check` when `text` is missing or blank.
    pub default_question: String,
    /// Used by `/send_per_check`, which never reads `text`.
    pub caption_prompt: String,
}

impl Default for Questions {
    fn default() -> Self {
        Self {
            default_question: DEFAULT_QUESTION.to_string(),
            caption_prompt: DEFAULT_CAPTION_PROMPT.to_string(),
        }
    }
}

impl Questions {
    /// Picks the client's question, falling back to the default one.
    pub fn resolve(&self, text: Option<String>) -> String {
        match text {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => self.default_question.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory for uploads; the system temp dir when unset.
    pub upload_dir: Option<PathBuf>,
    pub keep_uploads: bool,
    pub max_upload_bytes: usize,
    /// Maximum number of tokens the model generates per answer.
    pub sample_len: usize,
    pub questions: Questions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            upload_dir: None,
            keep_uploads: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            sample_len: DEFAULT_SAMPLE_LEN,
            questions: Questions::default(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
