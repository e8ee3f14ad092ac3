use crate::error::Result;
use crate::llm::client::AnalysisBackend;
use crate::llm::prompts::{analyst_system_prompt, build_analysis_prompt, build_follow_up_prompt};
use crate::llm::stream::StreamEvent;
use crate::llm::types::Content;
use crate::schema::{SimulationConfig, SimulationSummary};
use futures::StreamExt;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    Started { request_id: u64 },
    Chunk { request_id: u64, text: String },
    Finished { request_id: u64, reply: String },
    /// The request can be retried by issuing a new one.
    Failed {
        request_id: u64,
        error: String,
        retryable: bool,
    },
}

impl AnalysisEvent {
    pub fn request_id(&self) -> u64 {
        match self {
            Self::Started { request_id }
            | Self::Chunk { request_id, .. }
            | Self::Finished { request_id, .. }
            | Self::Failed { request_id, .. } => *request_id,
        }
    }
}

struct Conversation {
    active_request: Option<u64>,
    history: Vec<Content>,
}

struct Shared {
    conversation: Mutex<Conversation>,
    events: UnboundedSender<AnalysisEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Conversation> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers `event` only while `request_id` is the active request.
    fn emit(&self, request_id: u64, event: AnalysisEvent) -> bool {
        let conversation = self.lock();
        if conversation.active_request != Some(request_id) {
            return false;
        }
        self.events.send(event).is_ok()
    }

    fn finish(&self, request_id: u64, prompt: Content, reply: String) {
        let mut conversation = self.lock();
        if conversation.active_request != Some(request_id) {
            return;
        }
        conversation.history.push(prompt);
        conversation.history.push(Content::model(reply.clone()));
        conversation.active_request = None;
        let _ = self.events.send(AnalysisEvent::Finished { request_id, reply });
    }

    fn fail(&self, request_id: u64, error: String, retryable: bool) {
        let mut conversation = self.lock();
        if conversation.active_request != Some(request_id) {
            return;
        }
        conversation.active_request = None;
        let _ = self.events.send(AnalysisEvent::Failed {
            request_id,
            error,
            retryable,
        });
    }
}

/// Conversation with the analysis model about one projection. At most one
/// request streams at a time; starting another abandons the previous one
/// and none of its later events are delivered.
///
/// Must be driven from inside a tokio runtime.
pub struct AnalysisSession {
    backend: Arc<dyn AnalysisBackend>,
    shared: Arc<Shared>,
    system_prompt: String,
    in_flight: Option<JoinHandle<()>>,
    next_request_id: u64,
}

impl AnalysisSession {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> (Self, UnboundedReceiver<AnalysisEvent>) {
        let (tx, rx) = unbounded_channel();
        let shared = Arc::new(Shared {
            conversation: Mutex::new(Conversation {
                active_request: None,
                history: Vec::new(),
            }),
            events: tx,
        });

        let session = Self {
            backend,
            shared,
            system_prompt: analyst_system_prompt(),
            in_flight: None,
            next_request_id: 0,
        };
        (session, rx)
    }

    /// Starts a fresh conversation about `config` and `summary`.
    pub fn analyze(&mut self, config: &SimulationConfig, summary: &SimulationSummary) -> Result<u64> {
        let prompt = build_analysis_prompt(config, summary)?;
        info!("Requesting narrative analysis");
        Ok(self.start(Content::user(prompt), true))
    }

    pub fn follow_up(&mut self, question: &str) -> u64 {
        self.start(Content::user(build_follow_up_prompt(question)), false)
    }

    /// Abandons the in-flight request, if any.
    pub fn cancel(&mut self) {
        self.shared.lock().active_request = None;
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }

    pub fn is_busy(&self) -> bool {
        self.shared.lock().active_request.is_some()
    }

    /// Completed turns only; abandoned or failed requests leave no trace.
    pub fn history(&self) -> Vec<Content> {
        self.shared.lock().history.clone()
    }

    fn start(&mut self, prompt: Content, reset: bool) -> u64 {
        self.next_request_id += 1;
        let request_id = self.next_request_id;

        let messages = {
            let mut conversation = self.shared.lock();
            if let Some(previous) = conversation.active_request {
                debug!("Request {} superseded by {}", previous, request_id);
            }
            conversation.active_request = Some(request_id);
            if reset {
                conversation.history.clear();
            }
            let mut messages = conversation.history.clone();
            messages.push(prompt.clone());
            messages
        };

        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }

        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.shared);
        let system_prompt = self.system_prompt.clone();

        self.in_flight = Some(tokio::spawn(async move {
            if !shared.emit(request_id, AnalysisEvent::Started { request_id }) {
                return;
            }

            let mut stream = match backend.stream_reply(system_prompt, messages).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Analysis request {} failed to start: {}", request_id, e);
                    shared.fail(request_id, e.to_string(), e.is_retryable());
                    return;
                }
            };

            let mut reply = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(StreamEvent::Text(text)) => {
                        reply.push_str(&text);
                        let chunk = AnalysisEvent::Chunk { request_id, text };
                        if !shared.emit(request_id, chunk) {
                            return;
                        }
                    }
                    Ok(StreamEvent::Done) => break,
                    Err(e) => {
                        warn!("Analysis request {} aborted: {}", request_id, e);
                        shared.fail(request_id, e.to_string(), e.is_retryable());
                        return;
                    }
                }
            }

            shared.finish(request_id, prompt, reply);
        }));

        request_id
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}
