use crate::model::{RequestMetadata, VqaModel, VqaRequest};
use std::{
    sync::{Arc, Mutex, PoisonError, mpsc},
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tokio::sync::oneshot;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Represents the current state of the inference engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VqaEngineState {
    /// The engine is waiting for the next request.
    Idle,
    /// The engine is running an inference.
    Processing,
    /// The worker thread has shut down and no request will be served.
    Stopped,
}

impl VqaEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            VqaEngineState::Idle => "idle",
            VqaEngineState::Processing => "processing",
            VqaEngineState::Stopped => "stopped",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("inference failed: {0}")]
    Inference(#[source] BoxError),
    #[error("the inference engine is stopped")]
    Stopped,
    #[error("the inference worker exited before answering")]
    WorkerLost,
}

/// Answer returned by the engine together with its telemetry.
#[derive(Debug)]
pub struct VqaEngineResponse {
    /// Identifier assigned when the request was submitted.
    pub id: u64,
    /// Timestamp when the inference started.
    pub start_time: Instant,
    /// Time spent inside the model.
    pub duration: Duration,
    pub request_metadata: RequestMetadata,
    /// Raw text produced by the model.
    pub answer: String,
}

struct VqaEngineJob {
    id: u64,
    request: VqaRequest,
    reply: oneshot::Sender<Result<VqaEngineResponse, EngineError>>,
}

/// Runs a `VqaModel` on a dedicated worker thread.
///
/// Requests are served one at a time in submission order; each caller gets its
/// own answer back through a one-shot channel. A failing inference only fails
/// the request that caused it.
pub struct VqaEngine {
    state: Arc<Mutex<VqaEngineState>>,
    req_tx: Option<mpsc::Sender<VqaEngineJob>>,
    inference_handle: Option<JoinHandle<()>>,
    next_id: Mutex<u64>,
}

/// Owned by the worker thread; marks the engine stopped however the worker
/// exits, including a panic inside the model.
struct WorkerExit {
    state: Arc<Mutex<VqaEngineState>>,
    req_rx: Option<mpsc::Receiver<VqaEngineJob>>,
}

impl WorkerExit {
    fn next_job(&self) -> Option<VqaEngineJob> {
        self.req_rx.as_ref()?.recv().ok()
    }
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::error!("Inference worker panicked");
        }
        // close the queue before publishing the state so that `stopped`
        // always means submissions are refused
        self.req_rx.take();
        set_state(&self.state, VqaEngineState::Stopped);
    }
}

impl VqaEngine {
    /// Moves the model onto a new worker thread and starts accepting requests.
    pub fn new<M>(mut model: M) -> std::io::Result<Self>
    where
        M: VqaModel + Send + 'static,
    {
        let (req_tx, req_rx) = mpsc::channel::<VqaEngineJob>();
        let state = Arc::new(Mutex::new(VqaEngineState::Idle));

        let inference_handle = std::thread::Builder::new()
            .name("vqa-engine".to_string())
            .spawn({
                let state = state.clone();
                move || {
                    let worker = WorkerExit {
                        state,
                        req_rx: Some(req_rx),
                    };
                    let state = &worker.state;

                    while let Some(job) = worker.next_job() {
                        log::debug!("Running inference #{}", job.id);

                        let request_metadata = job.request.metadata();

                        set_state(state, VqaEngineState::Processing);
                        let start_time = Instant::now();

                        let result = match model.run(job.request) {
                            Ok(response) => {
                                log::debug!("Inference #{} completed", job.id);
                                Ok(VqaEngineResponse {
                                    id: job.id,
                                    start_time,
                                    duration: start_time.elapsed(),
                                    request_metadata,
                                    answer: response.answer,
                                })
                            }
                            Err(e) => {
                                log::error!("Inference #{} failed: {}", job.id, e);
                                Err(EngineError::Inference(Box::new(e)))
                            }
                        };

                        set_state(state, VqaEngineState::Idle);

                        if job.reply.send(result).is_err() {
                            log::debug!("Caller of inference #{} went away", job.id);
                        }
                    }
                }
            })?;

        Ok(Self {
            state,
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            next_id: Mutex::new(0),
        })
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> VqaEngineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a request and waits for the worker to answer it.
    pub async fn submit(&self, request: VqaRequest) -> Result<VqaEngineResponse, EngineError> {
        let tx = self.req_tx.as_ref().ok_or(EngineError::Stopped)?;
        let (reply, answer) = oneshot::channel();

        // ids follow queue order because they are handed out under the same lock
        let id = {
            let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            let id = *next_id;
            tx.send(VqaEngineJob { id, request, reply })
                .map_err(|_| EngineError::Stopped)?;
            *next_id += 1;
            id
        };
        log::debug!("Scheduled inference #{}", id);

        answer.await.map_err(|_| EngineError::WorkerLost)?
    }

    /// Stops the engine and waits for the in-flight inference to finish.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            let _ = handle.join();
        }
        set_state(&self.state, VqaEngineState::Stopped);
    }
}

impl Drop for VqaEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(state: &Mutex<VqaEngineState>, next: VqaEngineState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}
