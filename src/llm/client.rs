use crate::error::{ProjectionError, Result};
use crate::llm::stream::{SseDecoder, StreamEvent};
use crate::llm::types::*;
use futures::future::{self, BoxFuture};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use log::debug;
use reqwest::Client;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.0-flash";

pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// Source of streamed model replies for an [`crate::llm::AnalysisSession`].
pub trait AnalysisBackend: Send + Sync + 'static {
    fn stream_reply(
        &self,
        system_prompt: String,
        history: Vec<Content>,
    ) -> BoxFuture<'static, Result<EventStream>>;
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: DEFAULT_ANALYSIS_MODEL.to_string(),
        }
    }

    /// Points the client at a relay exposing the same streaming endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub async fn stream_generate_content(
        &self,
        model: &str,
        system_prompt: &str,
        messages: Vec<Content>,
    ) -> Result<EventStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: messages,
            system_instruction: Some(Content::user(system_prompt)),
            generation_config: GenerationConfig {
                temperature: Some(0.4),
            },
        };

        debug!("Opening analysis stream with model {}", model);
        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(ProjectionError::AnalysisFailed(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        Ok(decode_event_stream(res.bytes_stream()))
    }
}

/// Turns a raw `text/event-stream` body into stream events. The decoder is
/// flushed once the body ends, so a final event without its trailing blank
/// line still arrives, and a `Done` always closes the stream.
pub(crate) fn decode_event_stream<S, B, E>(chunks: S) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ProjectionError> + Send + 'static,
{
    chunks
        .map(Some)
        .chain(stream::once(future::ready(None)))
        .scan(SseDecoder::new(), |decoder, chunk| {
            let decoded = match chunk {
                Some(Ok(bytes)) => decoder.push(bytes.as_ref()),
                Some(Err(e)) => vec![Err(e.into())],
                None => decoder.finish(),
            };
            future::ready(Some(stream::iter(decoded)))
        })
        .flatten()
        // Gemini closes the stream without an explicit marker.
        .chain(stream::once(future::ready(Ok(StreamEvent::Done))))
        .boxed()
}

impl AnalysisBackend for GeminiClient {
    fn stream_reply(
        &self,
        system_prompt: String,
        history: Vec<Content>,
    ) -> BoxFuture<'static, Result<EventStream>> {
        let client = self.clone();
        Box::pin(async move {
            let model = client.model.clone();
            client
                .stream_generate_content(&model, &system_prompt, history)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_events(chunks: Vec<&'static str>) -> Vec<StreamEvent> {
        let body = stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok::<_, ProjectionError>(chunk.as_bytes().to_vec())),
        );
        decode_event_stream(body)
            .map(|event| event.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_unterminated_final_event_is_flushed() {
        let events = collect_events(vec![
            "data: {\"text\": \"Cash \"}\n\n",
            "data: {\"text\": \"stays positive.\"}",
        ])
        .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Text("Cash ".to_string()),
                StreamEvent::Text("stays positive.".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_terminated_stream_ends_with_single_done() {
        let events = collect_events(vec!["data: {\"text\": \"Hi\"}\n\n"]).await;

        assert_eq!(
            events,
            vec![StreamEvent::Text("Hi".to_string()), StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_transport_error_is_forwarded() {
        let body = stream::iter(vec![
            Ok(b"data: {\"text\": \"a\"}\n\n".to_vec()),
            Err(ProjectionError::StreamDecode("connection reset".to_string())),
        ]);
        let events: Vec<_> = decode_event_stream(body).collect().await;

        assert!(matches!(events[0], Ok(StreamEvent::Text(_))));
        assert!(matches!(events[1], Err(ProjectionError::StreamDecode(_))));
        assert!(matches!(events[2], Ok(StreamEvent::Done)));
    }
}
