use argh::FromArgs;
use digitaleye::{
    PaligemmaModel, Questions, ServerConfig, UploadStore, VqaEngine, VqaService, config,
};
use std::{path::PathBuf, sync::Arc};

#[derive(FromArgs)]
/// DigitalEye answers questions about uploaded images.
struct DigitalEyeArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "config::DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "config::DEFAULT_PORT")]
    port: u16,

    /// directory where uploads are written (defaults to the system temp dir)
    #[argh(option)]
    upload_dir: Option<PathBuf>,

    /// keep uploaded images on disk after answering
    #[argh(switch)]
    keep_uploads: bool,

    /// maximum size of a request body in bytes
    #[argh(option, default = "config::DEFAULT_MAX_UPLOAD_BYTES")]
    max_upload_bytes: usize,

    /// maximum number of tokens generated per answer
    #[argh(option, default = "config::DEFAULT_SAMPLE_LEN")]
    sample_len: usize,

    /// question asked on /send_check when none is given
    #[argh(option, default = "config::DEFAULT_QUESTION.to_string()")]
    default_question: String,

    /// prompt used by /send_per_check
    #[argh(option, default = "config::DEFAULT_CAPTION_PROMPT.to_string()")]
    caption_prompt: String,
}

impl From<DigitalEyeArgs> for ServerConfig {
    fn from(args: DigitalEyeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            upload_dir: args.upload_dir,
            keep_uploads: args.keep_uploads,
            max_upload_bytes: args.max_upload_bytes,
            sample_len: args.sample_len,
            questions: Questions {
                default_question: args.default_question,
                caption_prompt: args.caption_prompt,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config: ServerConfig = argh::from_env::<DigitalEyeArgs>().into();

    let store = UploadStore::open(config.upload_dir.as_deref(), config.keep_uploads)?;
    log::info!("Storing uploads in {}", store.root().display());

    log::info!("Loading PaliGemma");
    let model = PaligemmaModel::new(config.sample_len)?;
    let engine = VqaEngine::new(model)?;

    let service = Arc::new(VqaService::new(engine, store, config.questions.clone()));
    digitaleye::serve(&config, service).await?;

    Ok(())
}
