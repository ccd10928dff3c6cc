//! ExecutionLoop - drives one session from running to a terminal condition
//!
//! Strictly serial per session; concurrency lives across sessions in the
//! manager. One tick is one LLM round trip: cancellation and budget checks,
//! health, compaction, the streaming call feeding the signal parser, tool
//! dispatch with repetition defense, the batch signal pass, and the
//! completion and event gates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::ActivityRecorder;
use crate::broadcast::Broadcaster;
use crate::checkpoint::{Checkpoint, FailureContext, HandoffSummary};
use crate::config::{Config, PricingConfig, SessionConfig};
use crate::context::{ContextGuard, Summarizer};
use crate::domain::{ActivityKind, EventRecord, Hat, ItemStatus, Session, Task, TerminationReason, Topic};
use crate::events::{EventRouter, RouteOutcome};
use crate::health::LoopHealth;
use crate::llm::{CompletionRequest, CompletionResponse, ContentBlock, LlmClient, Message, StreamChunk};
use crate::quality::{QUALITY_BLOCKED, QUALITY_PASSED};
use crate::signals::{
    ACKNOWLEDGE_FAILURES, ChecklistOutcome, ChecklistSignal, ProcessedSignals, StreamingSignalParser,
    has_task_complete, parse_batch, parse_events,
};
use crate::store::{CheckpointRecord, Store};
use crate::tools::{ResponseShaper, ToolContext, ToolExecutor, ToolResult};
use crate::vcs;

/// How the loop ended
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub reason: TerminationReason,
    /// Set when the loop exited through a hat transition
    pub next_hat: Option<Hat>,
}

impl LoopOutcome {
    fn exit(reason: TerminationReason) -> Self {
        Self {
            reason,
            next_hat: None,
        }
    }
}

/// One iteration's verdict
enum Tick {
    Continue,
    Exit(TerminationReason, Option<Hat>),
}

/// Execution loop for one session
pub struct ExecutionLoop {
    session: Session,
    task: Task,
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmClient>,
    broadcaster: Arc<dyn Broadcaster>,
    activity: ActivityRecorder,
    guard: ContextGuard,
    executor: ToolExecutor,
    tool_ctx: ToolContext,
    shaper: Arc<ResponseShaper>,
    health: LoopHealth,
    router: EventRouter,
    pricing: PricingConfig,
    session_cfg: SessionConfig,
    max_tokens: u32,
    system_prompt: String,
    transcript: Vec<Message>,
    cancel: CancellationToken,
    failure: Option<FailureContext>,
    dirty: bool,
}

impl ExecutionLoop {
    /// Create a loop for a session
    pub fn new(
        session: Session,
        task: Task,
        store: Arc<dyn Store>,
        llm: Arc<dyn LlmClient>,
        broadcaster: Arc<dyn Broadcaster>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Self {
        debug!(session_id = %session.id, hat = %session.hat, "ExecutionLoop::new: called");
        let shaper = Arc::new(ResponseShaper::new(&session.id));
        let executor = ToolExecutor::for_hat(session.hat, shaper.clone());
        let tool_ctx = ToolContext::new(PathBuf::from(&session.worktree), session.id.clone());
        let activity = ActivityRecorder::new(store.clone(), broadcaster.clone(), &session.id);
        let system_prompt = build_system_prompt(&task, session.hat, &session.worktree);

        Self {
            guard: ContextGuard::new(config.context.into()),
            health: LoopHealth::new(config.health.into()),
            router: EventRouter::new(),
            pricing: config.pricing,
            session_cfg: config.session,
            max_tokens: config.llm.max_tokens,
            system_prompt,
            transcript: Vec::new(),
            failure: None,
            dirty: false,
            session,
            task,
            store,
            llm,
            broadcaster,
            activity,
            executor,
            tool_ctx,
            shaper,
            cancel,
        }
    }

    /// Builder method to attach a compaction summarizer
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.guard = self.guard.with_summarizer(summarizer);
        self
    }

    /// Builder method to wire provider access into the tool context
    pub fn with_provider_access(
        mut self,
        provider: Arc<dyn crate::vcs::ProviderClient>,
        auth_token: Option<String>,
        repo_owner: Option<String>,
        repo_name: Option<String>,
    ) -> Self {
        self.tool_ctx.provider = Some(provider);
        self.tool_ctx.auth_token = auth_token;
        self.tool_ctx.repo_owner = repo_owner;
        self.tool_ctx.repo_name = repo_name;
        self
    }

    /// Restore state from the latest checkpoint
    ///
    /// `predecessor` restores from another session's checkpoint instead of
    /// this one's. An unknown hat in the checkpoint keeps the current hat;
    /// the tool set stays bound to the session hat either way.
    pub async fn restore(&mut self, predecessor: Option<&str>) {
        let source = predecessor.unwrap_or(&self.session.id).to_string();
        debug!(%source, "ExecutionLoop::restore: called");

        let record = match self.store.latest_checkpoint(&source).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(%source, "ExecutionLoop::restore: no checkpoint");
                return;
            }
            Err(e) => {
                warn!(error = %e, "ExecutionLoop::restore: checkpoint load failed");
                return;
            }
        };

        let checkpoint = Checkpoint::from_value(record.payload);
        self.session.iteration = checkpoint.iteration;
        self.session.input_tokens = checkpoint.input_tokens;
        self.session.output_tokens = checkpoint.output_tokens;
        self.session.scratchpad = checkpoint.scratchpad.clone();

        match checkpoint.hat() {
            Some(hat) => {
                self.session.hat = hat;
                self.executor = ToolExecutor::for_hat(hat, self.shaper.clone());
                self.system_prompt = build_system_prompt(&self.task, hat, &self.session.worktree);
            }
            None => {
                warn!(stored = %checkpoint.hat, current = %self.session.hat, "ExecutionLoop::restore: unknown hat, keeping current");
            }
        }

        self.transcript = checkpoint.restore_transcript();
        info!(
            session_id = %self.session.id,
            iteration = self.session.iteration,
            turns = self.transcript.len(),
            "Restored session from checkpoint"
        );
    }

    /// Run to a terminal condition; returns the final session and outcome
    pub async fn run(mut self) -> (Session, LoopOutcome) {
        info!(session_id = %self.session.id, task_id = %self.task.id, hat = %self.session.hat, "ExecutionLoop: starting");

        if self.session.started_at.is_none() {
            self.session.started_at = Some(Utc::now());
        }
        self.seed_transcript().await;

        let outcome = loop {
            // 1. Cancellation
            if self.cancel.is_cancelled() {
                debug!(session_id = %self.session.id, "ExecutionLoop: cancelled");
                break LoopOutcome::exit(TerminationReason::UserStopped);
            }

            // 2. Budget caps - soft failure, pauses the session
            if let Some(reason) = self.budget_breach() {
                warn!(session_id = %self.session.id, %reason, "ExecutionLoop: budget breached");
                self.broadcaster.publish(
                    "session.approval_required",
                    json!({
                        "session_id": self.session.id,
                        "task_id": self.task.id,
                        "reason": reason.to_string(),
                    }),
                );
                break LoopOutcome::exit(reason);
            }

            // 3. Health verdict
            if let Some(reason) = self.health.should_terminate() {
                warn!(session_id = %self.session.id, %reason, "ExecutionLoop: health terminated");
                self.activity
                    .record(
                        self.session.iteration,
                        self.session.hat,
                        ActivityKind::LoopHealth,
                        json!({ "reason": reason.to_string() }),
                    )
                    .await;
                break LoopOutcome::exit(reason);
            }

            // 4. Compaction
            if let Some(result) = self.guard.check_and_compact(&self.transcript, &self.session.scratchpad).await {
                info!(
                    session_id = %self.session.id,
                    level = result.level,
                    removed = result.removed_units,
                    fell_back = result.fell_back,
                    "ExecutionLoop: compacted transcript"
                );
                self.transcript = result.transcript;
                self.dirty = true;
                self.checkpoint().await;
            }

            // 5-13. One round trip
            match self.tick().await {
                Tick::Continue => {}
                Tick::Exit(reason, next_hat) => break LoopOutcome { reason, next_hat },
            }
        };

        self.finish().await;
        info!(session_id = %self.session.id, reason = %outcome.reason, "ExecutionLoop: finished");
        (self.session, outcome)
    }

    /// One LLM round trip plus whatever it asked for
    async fn tick(&mut self) -> Tick {
        let request = CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            messages: self.transcript.clone(),
            tools: self.executor.definitions(),
            max_tokens: self.max_tokens,
            model: Some(self.task.model.clone()),
        };
        debug!(session_id = %self.session.id, turns = request.messages.len(), "tick: sending request");

        // Stream, feeding deltas into the signal parser so checklist
        // updates surface while the model is still typing.
        let (chunk_tx, chunk_rx) = mpsc::channel::<StreamChunk>(256);
        let applier = self.checklist_applier();
        let consumer = tokio::spawn(consume_stream(chunk_rx, applier));

        let llm = self.llm.clone();
        let response = tokio::select! {
            result = llm.stream(request, chunk_tx) => result,
            _ = self.cancel.cancelled() => {
                debug!(session_id = %self.session.id, "tick: cancelled mid-stream");
                consumer.abort();
                return Tick::Exit(TerminationReason::UserStopped, None);
            }
        };

        let mut processed = match consumer.await {
            Ok(processed) => processed,
            Err(_) => ProcessedSignals::new(),
        };

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_rate_limit() => {
                let delay = e.retry_after().unwrap_or(Duration::from_secs(60));
                warn!(session_id = %self.session.id, ?delay, "tick: rate limited");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => return Tick::Continue,
                    _ = self.cancel.cancelled() => return Tick::Exit(TerminationReason::UserStopped, None),
                }
            }
            Err(e) if e.is_retryable() => {
                warn!(session_id = %self.session.id, error = %e, "tick: retryable LLM error");
                self.health.record_failure();
                return Tick::Continue;
            }
            Err(e) => {
                warn!(session_id = %self.session.id, error = %e, "tick: LLM transport error");
                self.failure = Some(FailureContext {
                    last_error: e.to_string(),
                    failed_at: format!("iteration {}", self.session.iteration + 1),
                    recovery_hint: "restart the session; the transcript is checkpointed".to_string(),
                });
                return Tick::Exit(TerminationReason::Error { message: e.to_string() }, None);
            }
        };

        // 7. Counters and the iteration broadcast
        self.session.iteration += 1;
        self.session.input_tokens += response.usage.input_tokens;
        self.session.output_tokens += response.usage.output_tokens;
        self.session.last_activity_at = Some(Utc::now());
        self.dirty = true;

        let usage_ratio = self.guard.usage_ratio(&self.transcript);
        self.broadcaster.publish(
            "session.iteration",
            json!({
                "session_id": self.session.id,
                "iteration": self.session.iteration,
                "input_tokens": self.session.input_tokens,
                "output_tokens": self.session.output_tokens,
                "context_usage": usage_ratio,
            }),
        );
        if let Err(e) = self.store.update_session(self.session.clone()).await {
            warn!(error = %e, "tick: session update failed");
        }

        // 8. Tool dispatch
        if !response.tool_calls.is_empty() {
            self.dispatch_tools(&response).await;
            return Tick::Continue;
        }

        // 9-13. Pure text response
        self.handle_text_response(response, &mut processed).await
    }

    /// Dispatch the response's tool calls in order and append the matching
    /// tool_result user turn
    async fn dispatch_tools(&mut self, response: &CompletionResponse) {
        debug!(session_id = %self.session.id, tool_count = response.tool_calls.len(), "dispatch_tools: called");

        let mut blocks = Vec::new();
        if let Some(text) = &response.content
            && !text.is_empty()
        {
            blocks.push(ContentBlock::text(text));
        }
        for call in &response.tool_calls {
            blocks.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }
        self.transcript.push(Message::assistant_blocks(blocks));

        let mut results: Vec<(String, ToolResult)> = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            self.activity
                .record(
                    self.session.iteration,
                    self.session.hat,
                    ActivityKind::ToolCall,
                    json!({ "tool": call.name, "input": call.input }),
                )
                .await;

            let result = if !self.health.check_repetition(&call.name, &call.input) {
                warn!(session_id = %self.session.id, tool = %call.name, "dispatch_tools: repetition blocked");
                ToolResult::error(format!(
                    "Tool call blocked: {} was repeated with identical parameters too many times",
                    call.name
                ))
            } else {
                let result = self.executor.execute(call, &self.tool_ctx).await;
                if result.is_error {
                    self.health.record_failure();
                } else {
                    self.health.record_success();
                }
                if call.name == "task_complete" {
                    self.note_quality_gate(&result.content).await;
                }
                result
            };

            self.activity
                .record(
                    self.session.iteration,
                    self.session.hat,
                    ActivityKind::ToolResult,
                    json!({
                        "tool": call.name,
                        "is_error": result.is_error,
                        "content": result.content.chars().take(500).collect::<String>(),
                    }),
                )
                .await;

            results.push((call.id.clone(), result));
        }

        let result_blocks: Vec<ContentBlock> = results
            .into_iter()
            .map(|(id, result)| ContentBlock::tool_result(id, result.content, result.is_error))
            .collect();
        self.transcript.push(Message::user_blocks(result_blocks));
    }

    /// Track quality-gate outcomes surfaced by the task_complete tool
    async fn note_quality_gate(&mut self, content: &str) {
        let passed = if content.starts_with(QUALITY_PASSED) {
            true
        } else if content.starts_with(QUALITY_BLOCKED) {
            false
        } else {
            return;
        };

        self.health.record_quality_gate(passed);
        self.activity
            .record(
                self.session.iteration,
                self.session.hat,
                ActivityKind::QualityGate,
                json!({ "passed": passed }),
            )
            .await;

        if !passed
            && let Ok(Some(checklist)) = self.store.get_checklist_for_task(&self.task.id).await
        {
            for item in checklist.items.iter().filter(|i| i.status == ItemStatus::Failed) {
                self.health.record_item_block(&item.id);
            }
        }
    }

    /// Steps 9-13: batch signals, completion gate, event gate, checkpoint
    /// cadence, continuation prompt
    async fn handle_text_response(&mut self, response: CompletionResponse, processed: &mut ProcessedSignals) -> Tick {
        let mut text = response.content.unwrap_or_default();
        if text.trim().is_empty() {
            debug!(session_id = %self.session.id, "handle_text_response: empty content, substituting placeholder");
            text = "(empty response)".to_string();
            self.health.record_validation_failure();
        } else {
            self.health.record_valid_response();
        }

        self.transcript.push(Message::assistant(text.clone()));
        self.activity
            .record_with_tokens(
                self.session.iteration,
                self.session.hat,
                ActivityKind::AssistantResponse,
                json!({ "chars": text.len() }),
                response.usage.input_tokens,
                response.usage.output_tokens,
            )
            .await;

        // Batch signal pass: checklist (minus streamed ids), scratchpad, memories
        let signals = parse_batch(&text, processed);
        let applier = self.checklist_applier();
        for signal in &signals.checklist {
            applier.apply(signal).await;
        }
        if let Some(pad) = signals.scratchpad {
            self.session.scratchpad = pad;
            self.dirty = true;
        }
        for memory in signals.memories {
            let record = crate::domain::Memory::new(
                &self.task.project_id,
                memory.kind,
                memory.content,
                self.session.hat,
                &self.task.id,
                &self.session.id,
            );
            let payload = json!({ "memory_id": record.id, "kind": memory.kind, "title": record.title });
            if let Err(e) = self.store.create_memory(record).await {
                warn!(error = %e, "handle_text_response: memory create failed");
            } else {
                self.activity
                    .record(self.session.iteration, self.session.hat, ActivityKind::MemoryCreated, payload)
                    .await;
            }
        }

        // 10. Completion gate
        if has_task_complete(&text) {
            return self.completion_gate(&text).await;
        }

        // 11. Event gate
        if let Some(event) = parse_events(&text).into_iter().find(|e| e.topic != Topic::TaskComplete) {
            return self.event_gate(event.topic, event.payload).await;
        }

        // 12. Checkpoint cadence
        if self.session.iteration % self.session_cfg.checkpoint_interval == 0 {
            self.checkpoint().await;
        }

        // 13. Continuation prompt
        let prompt = if self.guard.above_target(&self.transcript) {
            "Continue.".to_string()
        } else {
            self.session.hat.continuation_prompt().to_string()
        };
        self.transcript.push(Message::user(prompt));

        Tick::Continue
    }

    /// Step 10: honor `EVENT:task.complete` only when the checklist allows it
    async fn completion_gate(&mut self, text: &str) -> Tick {
        debug!(session_id = %self.session.id, "completion_gate: called");
        let checklist = self.store.get_checklist_for_task(&self.task.id).await.ok().flatten();
        let open: Vec<(String, String, ItemStatus)> = checklist
            .as_ref()
            .map(|list| {
                list.open_items()
                    .into_iter()
                    .map(|i| (i.id.clone(), i.description.clone(), i.status))
                    .collect()
            })
            .unwrap_or_default();

        if !open.is_empty() && !text.contains(ACKNOWLEDGE_FAILURES) {
            info!(session_id = %self.session.id, open = open.len(), "completion_gate: blocked by open items");
            let mut corrective = String::from("Cannot complete the task: these checklist items are not done:\n");
            for (id, description, status) in &open {
                corrective.push_str(&format!("- {}: {} [{}]\n", id, description, status.as_str()));
            }
            corrective.push_str(
                "\nFinish them (CHECKLIST_DONE:<id> or CHECKLIST_FAILED:<id>:<reason>), or repeat \
                 EVENT:task.complete together with ACKNOWLEDGE_FAILURES to complete anyway.",
            );
            self.transcript.push(Message::user(corrective));
            return Tick::Continue;
        }

        let acknowledged = !open.is_empty();
        if let Err(e) = self
            .store
            .create_event(EventRecord::new(&self.session.id, Topic::TaskComplete, self.session.hat))
            .await
        {
            warn!(error = %e, "completion_gate: event persist failed");
        }
        self.activity
            .record(
                self.session.iteration,
                self.session.hat,
                ActivityKind::Completion,
                json!({ "signal": "task.complete", "acknowledged_failures": acknowledged }),
            )
            .await;
        self.broadcaster.publish(
            "session.completed",
            json!({ "session_id": self.session.id, "task_id": self.task.id }),
        );

        Tick::Exit(TerminationReason::Completed, None)
    }

    /// Step 11: route a non-terminal event through the hat contracts
    async fn event_gate(&mut self, topic: Topic, payload: Option<serde_json::Value>) -> Tick {
        debug!(session_id = %self.session.id, %topic, "event_gate: called");
        match self.router.route(self.session.hat, topic) {
            Ok(RouteOutcome::Terminal) => {
                // Only task.complete is terminal and the completion gate
                // owns it; a terminal here means the topic set grew without
                // this match being updated.
                Tick::Exit(TerminationReason::Completed, None)
            }
            Ok(RouteOutcome::NextHat(next)) => {
                info!(session_id = %self.session.id, from = %self.session.hat, to = %next, %topic, "event_gate: hat transition");
                let mut record = EventRecord::new(&self.session.id, topic, self.session.hat);
                if let Some(payload) = payload {
                    record = record.with_payload(payload);
                }
                if let Err(e) = self.store.create_event(record).await {
                    warn!(error = %e, "event_gate: event persist failed");
                }
                self.activity
                    .record(
                        self.session.iteration,
                        self.session.hat,
                        ActivityKind::HatTransition,
                        json!({ "from": self.session.hat, "to": next, "topic": topic.as_str() }),
                    )
                    .await;
                self.broadcaster.publish(
                    "session.hat_transition",
                    json!({ "session_id": self.session.id, "from": self.session.hat, "to": next }),
                );
                self.health.reset_repetition();
                Tick::Exit(TerminationReason::HatTransition, Some(next))
            }
            Err(e) => {
                warn!(session_id = %self.session.id, error = %e, "event_gate: routing error");
                self.activity
                    .record(
                        self.session.iteration,
                        self.session.hat,
                        ActivityKind::DebugLog,
                        json!({ "routing_error": e.to_string() }),
                    )
                    .await;
                self.transcript.push(Message::user(format!(
                    "That event was not routed: {}. Emit only the events your hat may publish: {}.",
                    e,
                    self.session
                        .hat
                        .publishes()
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
                Tick::Continue
            }
        }
    }

    /// Step 2: evaluate the budget caps
    fn budget_breach(&self) -> Option<TerminationReason> {
        let budget = &self.session.budget;
        if self.session.iteration >= budget.max_iterations {
            return Some(TerminationReason::MaxIterations);
        }
        if self.session.total_tokens() >= budget.max_tokens {
            return Some(TerminationReason::MaxTokens);
        }
        let cost = self
            .pricing
            .cost_usd(&self.task.model, self.session.input_tokens, self.session.output_tokens);
        if cost >= budget.max_cost_usd {
            return Some(TerminationReason::MaxCost);
        }
        if let Some(started) = self.session.started_at
            && (Utc::now() - started).num_seconds() >= budget.max_runtime_secs as i64
        {
            return Some(TerminationReason::MaxRuntime);
        }
        None
    }

    /// Seed the first user turn when starting fresh
    async fn seed_transcript(&mut self) {
        if !self.transcript.is_empty() {
            return;
        }
        debug!(session_id = %self.session.id, "seed_transcript: called");

        let mut intro = format!("# Task: {}\n\n{}\n", self.task.title, self.task.description);

        if let Ok(Some(checklist)) = self.store.get_checklist_for_task(&self.task.id).await {
            intro.push_str("\n## Checklist\n");
            for item in &checklist.items {
                intro.push_str(&format!("- {}: {} [{}]\n", item.id, item.description, item.status.as_str()));
            }
        }

        if let Some(context) = &self.session.predecessor_context {
            intro.push_str("\n## Handoff from the previous session\n");
            intro.push_str(context);
            intro.push('\n');
        }

        self.transcript.push(Message::user(intro));
    }

    /// Deferred actions at loop exit
    async fn finish(&mut self) {
        self.session.quality_gate_attempts = self.health.quality_gate_attempts();
        self.shaper.cleanup();
        if self.dirty {
            self.checkpoint().await;
        }
    }

    /// Serialize and persist a checkpoint with a fresh handoff summary
    async fn checkpoint(&mut self) {
        debug!(session_id = %self.session.id, iteration = self.session.iteration, "checkpoint: called");
        let checklist = self.store.get_checklist_for_task(&self.task.id).await.ok().flatten();
        let branch = vcs::current_branch(std::path::Path::new(&self.session.worktree))
            .await
            .unwrap_or_else(|_| self.task.branch.clone());

        let handoff = HandoffSummary::build(
            &self.task.title,
            self.session.hat,
            &branch,
            checklist.as_ref(),
            &self.session.scratchpad,
        );

        let checkpoint = Checkpoint {
            iteration: self.session.iteration,
            input_tokens: self.session.input_tokens,
            output_tokens: self.session.output_tokens,
            hat: self.session.hat.as_str().to_string(),
            transcript: self.transcript.clone(),
            scratchpad: self.session.scratchpad.clone(),
            failure: self.failure.clone(),
            handoff: Some(handoff),
            legacy_tokens_used: None,
        };

        let record = CheckpointRecord {
            session_id: self.session.id.clone(),
            iteration: self.session.iteration,
            payload: checkpoint.to_value(),
        };

        if let Err(e) = self.store.save_checkpoint(record).await {
            warn!(error = %e, "checkpoint: save failed");
        } else {
            self.dirty = false;
        }
    }

    fn checklist_applier(&self) -> ChecklistApplier {
        ChecklistApplier {
            store: self.store.clone(),
            broadcaster: self.broadcaster.clone(),
            activity: self.activity.clone(),
            task_id: self.task.id.clone(),
            iteration: self.session.iteration + 1,
            hat: self.session.hat,
        }
    }
}

/// Applies checklist signals to the store and the realtime feed
///
/// Shared by the streaming consumer and the batch pass; streamed updates may
/// land before the assistant turn is appended to the transcript, which is
/// intentional - the UI sees progress as it is typed.
#[derive(Clone)]
struct ChecklistApplier {
    store: Arc<dyn Store>,
    broadcaster: Arc<dyn Broadcaster>,
    activity: ActivityRecorder,
    task_id: String,
    iteration: u32,
    hat: Hat,
}

impl ChecklistApplier {
    async fn apply(&self, signal: &ChecklistSignal) {
        let (status, notes) = match &signal.outcome {
            ChecklistOutcome::Done => (ItemStatus::Done, String::new()),
            ChecklistOutcome::Failed { reason } => (ItemStatus::Failed, reason.clone()),
        };

        match self
            .store
            .update_checklist_item(&self.task_id, &signal.item_id, status, &notes)
            .await
        {
            Ok(true) => {
                self.broadcaster.publish(
                    "checklist.updated",
                    json!({
                        "task_id": self.task_id,
                        "item_id": signal.item_id,
                        "status": status.as_str(),
                    }),
                );
                self.activity
                    .record(
                        self.iteration,
                        self.hat,
                        ActivityKind::ChecklistUpdate,
                        json!({ "item_id": signal.item_id, "status": status.as_str(), "notes": notes }),
                    )
                    .await;
            }
            Ok(false) => {
                debug!(item_id = %signal.item_id, "ChecklistApplier: unknown item id, ignoring");
            }
            Err(e) => {
                warn!(error = %e, item_id = %signal.item_id, "ChecklistApplier: store update failed");
            }
        }
    }
}

/// Drain the stream into the signal parser, applying checklist signals as
/// their lines complete; returns the processed-id set for the batch pass
async fn consume_stream(mut rx: mpsc::Receiver<StreamChunk>, applier: ChecklistApplier) -> ProcessedSignals {
    let mut parser = StreamingSignalParser::new();
    while let Some(chunk) = rx.recv().await {
        if let StreamChunk::TextDelta(delta) = chunk {
            for signal in parser.push_delta(&delta) {
                applier.apply(&signal).await;
            }
        }
    }
    for signal in parser.finish() {
        applier.apply(&signal).await;
    }
    parser.take_processed()
}

/// Cached system prompt for a hat working a task
fn build_system_prompt(task: &Task, hat: Hat, worktree: &str) -> String {
    format!(
        "You are the {hat} working the task \"{title}\".\n\
         Role: {role}\n\
         Working directory: {worktree}\n\n\
         Protocol - type these literally in your prose when they apply:\n\
         - CHECKLIST_DONE:<id> when a checklist item is verified done\n\
         - CHECKLIST_FAILED:<id>:<reason> when an item cannot be done\n\
         - SCRATCHPAD: followed by your running working notes\n\
         - MEMORY:<type>:<content> to record a durable project fact\n\
         - EVENT:<topic> when your phase is finished\n\
         You may publish: {topics}.",
        hat = hat,
        title = task.title,
        role = hat_role(hat),
        worktree = worktree,
        topics = hat.publishes().iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", "),
    )
}

fn hat_role(hat: Hat) -> &'static str {
    match hat {
        Hat::Explorer => "survey the repository and surface what matters for the task",
        Hat::Planner => "turn the task into an ordered, verifiable plan",
        Hat::Designer => "shape the technical design the plan calls for",
        Hat::Creator => "implement the plan against the worktree",
        Hat::Critic => "review the implementation and verdict it honestly",
        Hat::Editor => "finalize, verify the checklist, and close out the task",
        Hat::Resolver => "clear the blocker that stopped the previous hat",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelBroadcaster;
    use crate::domain::{Checklist, ChecklistItem};
    use crate::llm::client::mock::MockLlmClient;
    use crate::store::InMemoryStore;
    use tempfile::tempdir;

    fn fixture(responses: Vec<CompletionResponse>) -> (Arc<InMemoryStore>, ExecutionLoop, tempfile::TempDir) {
        let temp = tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let llm = Arc::new(MockLlmClient::new(responses));
        let broadcaster = Arc::new(ChannelBroadcaster::new(64));
        let config = Config::default();

        let task = Task::new("Test task", "Do the thing", "proj-1");
        let session = Session::new(&task.id, "proj-1", Hat::Editor, temp.path().to_string_lossy());

        let exec = ExecutionLoop::new(
            session,
            task,
            store.clone(),
            llm,
            broadcaster,
            &config,
            CancellationToken::new(),
        );
        (store, exec, temp)
    }

    #[tokio::test]
    async fn test_clean_text_completion() {
        let (store, exec, _temp) = fixture(vec![MockLlmClient::text_response("All done.\nEVENT:task.complete")]);
        store.create_task(exec.task.clone()).await.unwrap();

        let (session, outcome) = exec.run().await;

        assert_eq!(outcome.reason, TerminationReason::Completed);
        assert!(outcome.next_hat.is_none());
        assert_eq!(session.iteration, 1);
    }

    #[tokio::test]
    async fn test_iteration_budget_pauses() {
        let (_store, mut exec, _temp) = fixture(vec![]);
        exec.session.budget.max_iterations = 0;

        let (_session, outcome) = exec.run().await;
        assert_eq!(outcome.reason, TerminationReason::MaxIterations);
        assert!(outcome.reason.is_budget());
    }

    #[tokio::test]
    async fn test_cancellation_before_first_tick() {
        let (_store, exec, _temp) = fixture(vec![]);
        exec.cancel.cancel();

        let (_session, outcome) = exec.run().await;
        assert_eq!(outcome.reason, TerminationReason::UserStopped);
    }

    #[tokio::test]
    async fn test_llm_transport_error_checkpoints() {
        // No scripted responses: the mock errors with a non-retryable
        // InvalidResponse, which must surface as the termination reason and
        // still write the final checkpoint.
        let (store, exec, _temp) = fixture(vec![MockLlmClient::text_response("working...")]);
        let session_id = exec.session.id.clone();

        let (_session, outcome) = exec.run().await;
        assert!(matches!(outcome.reason, TerminationReason::Error { .. }));

        let checkpoint = store.latest_checkpoint(&session_id).await.unwrap().unwrap();
        let restored = Checkpoint::from_value(checkpoint.payload);
        assert!(restored.failure.is_some());
        assert!(!restored.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_scratchpad_captured_from_text_turn() {
        let (store, exec, _temp) = fixture(vec![
            MockLlmClient::text_response("SCRATCHPAD:\nParser rewritten, tests next.\nEVENT:task.complete"),
        ]);
        store.create_task(exec.task.clone()).await.unwrap();

        let (session, outcome) = exec.run().await;
        assert_eq!(outcome.reason, TerminationReason::Completed);
        assert_eq!(session.scratchpad, "Parser rewritten, tests next.");
    }

    #[tokio::test]
    async fn test_memory_signal_persists_with_provenance() {
        let (store, exec, _temp) = fixture(vec![MockLlmClient::text_response(
            "MEMORY:pitfall:The build cache is shared across worktrees.\nEVENT:task.complete",
        )]);
        store.create_task(exec.task.clone()).await.unwrap();
        let session_id = exec.session.id.clone();

        exec.run().await;

        let memories = store.list_memories_for_project("proj-1").await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].session_id, session_id);
        assert_eq!(memories[0].kind, crate::domain::MemoryType::Pitfall);
    }

    #[tokio::test]
    async fn test_empty_response_substitutes_placeholder() {
        let empty = CompletionResponse {
            content: Some(String::new()),
            tool_calls: vec![],
            stop_reason: crate::llm::StopReason::EndTurn,
            usage: crate::llm::TokenUsage::new(10, 0),
        };
        let (store, exec, _temp) = fixture(vec![empty, MockLlmClient::text_response("EVENT:task.complete")]);
        store.create_task(exec.task.clone()).await.unwrap();
        let session_id = exec.session.id.clone();

        let (_session, outcome) = exec.run().await;
        assert_eq!(outcome.reason, TerminationReason::Completed);

        let checkpoint = Checkpoint::from_value(store.latest_checkpoint(&session_id).await.unwrap().unwrap().payload);
        assert!(checkpoint.transcript.iter().any(|m| m.text().contains("(empty response)")));
    }

    #[tokio::test]
    async fn test_unpublishable_event_gets_corrective_turn() {
        let temp = tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let llm = Arc::new(MockLlmClient::new(vec![
            // creator may not publish review.approved
            MockLlmClient::text_response("EVENT:review.approved"),
            MockLlmClient::text_response("EVENT:implementation.done"),
        ]));
        let broadcaster = Arc::new(ChannelBroadcaster::new(64));
        let config = Config::default();
        let task = Task::new("T", "d", "proj-1");
        store.create_task(task.clone()).await.unwrap();
        let session = Session::new(&task.id, "proj-1", Hat::Creator, temp.path().to_string_lossy());

        let exec = ExecutionLoop::new(
            session,
            task,
            store.clone(),
            llm.clone(),
            broadcaster,
            &config,
            CancellationToken::new(),
        );

        let (_session, outcome) = exec.run().await;
        assert_eq!(outcome.reason, TerminationReason::HatTransition);
        assert_eq!(outcome.next_hat, Some(Hat::Critic));

        // The second request carried the corrective turn
        let requests = llm.requests();
        let corrective = requests[1].messages.last().unwrap().text();
        assert!(corrective.contains("was not routed"));
    }

    #[tokio::test]
    async fn test_checklist_streamed_update_not_double_applied() {
        let temp = tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let task = Task::new("T", "d", "proj-1");
        store.create_task(task.clone()).await.unwrap();
        store
            .create_checklist(Checklist::new(&task.id, vec![ChecklistItem::new("it-1", "works")]))
            .await
            .unwrap();

        let llm = Arc::new(MockLlmClient::new(vec![MockLlmClient::text_response(
            "CHECKLIST_DONE:it-1\nEVENT:task.complete",
        )]));
        let broadcaster = Arc::new(ChannelBroadcaster::new(64));
        let session = Session::new(&task.id, "proj-1", Hat::Editor, temp.path().to_string_lossy());
        let session_id = session.id.clone();
        let config = Config::default();

        let exec = ExecutionLoop::new(
            session,
            task.clone(),
            store.clone(),
            llm,
            broadcaster,
            &config,
            CancellationToken::new(),
        );
        let (_session, outcome) = exec.run().await;
        assert_eq!(outcome.reason, TerminationReason::Completed);

        let checklist = store.get_checklist_for_task(&task.id).await.unwrap().unwrap();
        assert!(checklist.all_done());

        // Exactly one checklist_update activity: the streaming parser fired
        // and the batch pass skipped the already-processed id.
        let updates = store
            .list_activity_for_session(&session_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.kind == ActivityKind::ChecklistUpdate)
            .count();
        assert_eq!(updates, 1);
    }
}
