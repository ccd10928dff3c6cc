//! LlmClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// Stateless LLM client - each call is independent
///
/// This is the core abstraction the execution loop drives. The loop owns
/// the transcript and replays it on every call; the client holds no
/// conversation state of its own.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion
    ///
    /// Sends chunks to the provided channel as they arrive and returns the
    /// final complete response. The loop drains the channel into the
    /// streaming signal parser so checklist updates surface while the model
    /// is still typing.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError>;
}

pub mod mock {
    //! Scriptable client for unit and scenario tests

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tracing::debug;

    use super::*;
    use crate::llm::{StopReason, TokenUsage, ToolCall};

    /// Mock LLM client that replays a fixed list of responses
    pub struct MockLlmClient {
        responses: Mutex<Vec<CompletionResponse>>,
        call_count: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            debug!(response_count = %responses.len(), "MockLlmClient::new: called");
            Self {
                responses: Mutex::new(responses),
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Number of completed calls so far
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Requests captured in call order (for asserting on transcripts)
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Build a plain text response ending the turn
        pub fn text_response(text: &str) -> CompletionResponse {
            CompletionResponse {
                content: Some(text.to_string()),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::new(100, 50),
            }
        }

        /// Build a response requesting one tool call
        pub fn tool_response(id: &str, name: &str, input: serde_json::Value) -> CompletionResponse {
            CompletionResponse {
                content: None,
                tool_calls: vec![ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    input,
                }],
                stop_reason: StopReason::ToolUse,
                usage: TokenUsage::new(100, 50),
            }
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::complete: called");
            self.requests.lock().unwrap().push(request);
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            let responses = self.responses.lock().unwrap();
            responses
                .get(idx)
                .cloned()
                .ok_or_else(|| LlmError::InvalidResponse("No more mock responses".to_string()))
        }

        async fn stream(
            &self,
            request: CompletionRequest,
            chunk_tx: mpsc::Sender<StreamChunk>,
        ) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::stream: called");
            let response = self.complete(request).await?;

            // Replay the response as a stream so parser wiring is exercised
            if let Some(text) = &response.content {
                for line in text.split_inclusive('\n') {
                    let _ = chunk_tx.send(StreamChunk::TextDelta(line.to_string())).await;
                }
            }
            for call in &response.tool_calls {
                let _ = chunk_tx
                    .send(StreamChunk::ToolUseStart {
                        id: call.id.clone(),
                        name: call.name.clone(),
                    })
                    .await;
                let _ = chunk_tx.send(StreamChunk::ToolUseEnd { id: call.id.clone() }).await;
            }
            let _ = chunk_tx
                .send(StreamChunk::MessageDone {
                    stop_reason: response.stop_reason.clone(),
                    usage: response.usage,
                })
                .await;

            Ok(response)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::llm::Message;

        fn request() -> CompletionRequest {
            CompletionRequest {
                system_prompt: "Test".to_string(),
                messages: vec![Message::user("hi")],
                tools: vec![],
                max_tokens: 1000,
                model: None,
            }
        }

        #[tokio::test]
        async fn test_mock_client_returns_responses_in_order() {
            let client = MockLlmClient::new(vec![
                MockLlmClient::text_response("Response 1"),
                MockLlmClient::text_response("Response 2"),
            ]);

            let resp1 = client.complete(request()).await.unwrap();
            assert_eq!(resp1.content, Some("Response 1".to_string()));

            let resp2 = client.complete(request()).await.unwrap();
            assert_eq!(resp2.content, Some("Response 2".to_string()));

            assert_eq!(client.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            assert!(client.complete(request()).await.is_err());
        }

        #[tokio::test]
        async fn test_mock_client_streams_text_deltas() {
            let client = MockLlmClient::new(vec![MockLlmClient::text_response("line one\nline two")]);
            let (tx, mut rx) = mpsc::channel(16);

            let response = client.stream(request(), tx).await.unwrap();
            assert_eq!(response.content, Some("line one\nline two".to_string()));

            let mut text = String::new();
            while let Ok(chunk) = rx.try_recv() {
                if let StreamChunk::TextDelta(delta) = chunk {
                    text.push_str(&delta);
                }
            }
            assert_eq!(text, "line one\nline two");
        }
    }
}
