use std::{collections::VecDeque, pin::Pin, sync::Arc, time::Instant};

use anyhow::anyhow;
use bridge_cli::{PermissionPolicy, SupervisedProcess, Supervisor, SupervisorEvent, SupervisorSettings, model};
use bridge_config::{CliConfig, Config};
use bridge_core::HttpError;
use bridge_telemetry::{
    Counter, Histogram, KeyValue,
    metrics::{self, record_duration},
};
use futures_util::{Stream, StreamExt, future, stream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    MessagesError,
    aggregate::MessageAccumulator,
    attachment::Attachments,
    invocation::build_invocation,
    normalize::{NormalizedRequest, normalize},
    protocol::{Message, MessagesRequest, StreamEvent, Usage},
    translate::Translator,
};

/// Stream of wire events for one request
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, MessagesError>> + Send>>;

/// Shared state for the messages endpoint
#[derive(Clone)]
pub struct MessagesState {
    inner: Arc<MessagesStateInner>,
}

struct MessagesStateInner {
    policy: PermissionPolicy,
    supervisor: Supervisor,
    cli: CliConfig,
    metrics: Metrics,
}

struct Metrics {
    invocations: Counter<u64>,
    duration: Histogram<f64>,
    first_fragment: Histogram<f64>,
    tokens: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = bridge_telemetry::meter();
        Self {
            invocations: meter
                .u64_counter(metrics::CLI_INVOCATION_COUNT)
                .with_description("claude CLI invocations by outcome")
                .build(),
            duration: meter
                .f64_histogram(metrics::CLI_INVOCATION_DURATION)
                .with_description("Wall-clock time of a claude CLI invocation")
                .with_unit("s")
                .build(),
            first_fragment: meter
                .f64_histogram(metrics::CLI_TIME_TO_FIRST_FRAGMENT)
                .with_description("Time from spawn to the first stdout line")
                .with_unit("s")
                .build(),
            tokens: meter
                .u64_counter(metrics::CLI_TOKEN_USAGE)
                .with_description("Tokens reported or estimated per invocation")
                .build(),
        }
    }
}

impl MessagesState {
    pub fn new(policy: PermissionPolicy, cli: CliConfig) -> Self {
        Self {
            inner: Arc::new(MessagesStateInner {
                policy,
                supervisor: Supervisor::new(SupervisorSettings::from(&cli)),
                cli,
                metrics: Metrics::new(),
            }),
        }
    }

    /// Build the state from configuration, validating the permission policy
    ///
    /// # Errors
    ///
    /// Returns an error if the configured permissions are unusable
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let policy = PermissionPolicy::from_config(&config.permissions)?;
        Ok(Self::new(policy, config.cli.clone()))
    }

    /// Run a request to completion and return the aggregated message
    pub async fn create_message(&self, request: MessagesRequest) -> Result<Message, MessagesError> {
        let mut pump = self.start(request).await?;
        let mut accumulator = MessageAccumulator::default();

        while let Some(event) = pump.next().await {
            accumulator.push(event?)?;
        }

        accumulator.finish()
    }

    /// Run a request as an event stream
    ///
    /// Waits for the first event so that failures before any output are
    /// returned as errors instead of in-band events. Dropping the stream
    /// kills the CLI and removes its attachments.
    pub async fn stream_message(&self, request: MessagesRequest) -> Result<EventStream, MessagesError> {
        let mut events = self.start(request).await?.into_stream();

        match events.next().await {
            Some(Ok(first)) => Ok(stream::once(future::ready(Ok(first))).chain(events).boxed()),
            Some(Err(e)) => Err(e),
            None => Err(anyhow!("claude CLI output ended before the first event").into()),
        }
    }

    async fn start(&self, request: MessagesRequest) -> Result<Pump, MessagesError> {
        let normalized = normalize(request)?;
        if !normalized.ignored_parameters.is_empty() {
            tracing::warn!(
                parameters = ?normalized.ignored_parameters,
                "sampling parameters are not supported by the claude CLI and were ignored"
            );
        }

        let model = model::resolve(&normalized.model)?;
        let (normalized, attachments) = self.materialize(normalized).await?;
        let invocation = build_invocation(&normalized, &model, &attachments, &self.inner.policy, &self.inner.cli)?;

        let prompt_chars = invocation.stdin.as_deref().map_or(0, |s| s.chars().count());
        let message_id = message_id();
        let cancel = CancellationToken::new();
        let process = self.inner.supervisor.spawn(invocation, &cancel).await?;

        tracing::info!(
            message_id = %message_id,
            model = %model.requested,
            cli_model = %model.cli_name,
            stream = normalized.stream,
            attachments = attachments.len(),
            pid = process.pid(),
            "claude CLI started"
        );

        Ok(Pump {
            attributes: vec![
                KeyValue::new("model", model.requested.clone()),
                KeyValue::new("stream", normalized.stream),
            ],
            translator: Translator::new(&message_id, &model.requested, prompt_chars),
            message_id,
            process,
            cancel,
            attachments,
            pending: VecDeque::new(),
            finished: false,
            recorded: false,
            started_at: Instant::now(),
            first_fragment: false,
            state: Arc::clone(&self.inner),
        })
    }

    async fn materialize(
        &self,
        request: NormalizedRequest,
    ) -> Result<(NormalizedRequest, Attachments), MessagesError> {
        if request.media_positions().next().is_none() {
            return Ok((request, Attachments::default()));
        }

        let state = Arc::clone(&self.inner);
        let (request, attachments) = tokio::task::spawn_blocking(move || {
            let attachments = Attachments::materialize(&request, &state.policy);
            (request, attachments)
        })
        .await
        .map_err(|e| anyhow!("attachment task failed: {e}"))?;

        Ok((request, attachments?))
    }
}

/// `msg_` followed by 24 hex characters
fn message_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("msg_{}", &id[..24])
}

/// Drives one CLI process through the translator
///
/// Owns everything scoped to the request: the process, its cancellation
/// token and the attachment files. Dropping it releases all three.
struct Pump {
    message_id: String,
    process: SupervisedProcess,
    translator: Translator,
    cancel: CancellationToken,
    attachments: Attachments,
    pending: VecDeque<StreamEvent>,
    finished: bool,
    recorded: bool,
    started_at: Instant,
    first_fragment: bool,
    attributes: Vec<KeyValue>,
    state: Arc<MessagesStateInner>,
}

impl Pump {
    async fn next(&mut self) -> Option<Result<StreamEvent, MessagesError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }

            let result = match self.process.next_event().await {
                Some(SupervisorEvent::Line(line)) => {
                    self.note_fragment();
                    self.translator.push_line(&line)
                }
                Some(SupervisorEvent::Completed) => {
                    self.finished = true;
                    self.translator.finish()
                }
                Some(SupervisorEvent::Failed(err)) => Err(err.into()),
                None => {
                    self.finished = true;
                    self.record("cancelled", None);
                    return None;
                }
            };

            match result {
                Ok(events) => {
                    if self.finished {
                        let usage = events.iter().find_map(|event| match event {
                            StreamEvent::MessageDelta { usage, .. } => Some(*usage),
                            _ => None,
                        });
                        self.record("ok", usage);
                    }
                    self.pending.extend(events);
                }
                Err(err) => {
                    tracing::warn!(message_id = %self.message_id, error = %err, "claude CLI request failed");
                    self.finished = true;
                    self.pending.clear();
                    self.cancel.cancel();
                    self.record(err.error_type(), None);
                    return Some(Err(err));
                }
            }
        }
    }

    fn into_stream(self) -> EventStream {
        stream::unfold(self, |mut pump| async move {
            let item = pump.next().await?;
            Some((item, pump))
        })
        .boxed()
    }

    fn note_fragment(&mut self) {
        if !self.first_fragment {
            self.first_fragment = true;
            record_duration(&self.state.metrics.first_fragment, self.started_at, &self.attributes);
        }
    }

    fn record(&mut self, outcome: &str, usage: Option<Usage>) {
        if self.recorded {
            return;
        }
        self.recorded = true;

        let metrics = &self.state.metrics;
        let mut attributes = self.attributes.clone();
        attributes.push(KeyValue::new("outcome", outcome.to_owned()));
        metrics.invocations.add(1, &attributes);
        record_duration(&metrics.duration, self.started_at, &attributes);

        if let Some(usage) = usage {
            for (kind, count) in [("input", usage.input_tokens), ("output", usage.output_tokens)] {
                let mut attributes = self.attributes.clone();
                attributes.push(KeyValue::new("token.type", kind));
                metrics.tokens.add(count, &attributes);
            }
            tracing::info!(
                message_id = %self.message_id,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                malformed_lines = self.translator.malformed_lines(),
                elapsed = ?self.started_at.elapsed(),
                "claude CLI completed"
            );
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        if !self.recorded {
            tracing::debug!(message_id = %self.message_id, "request dropped before the CLI finished");
            self.record("cancelled", None);
        }
        self.cancel.cancel();
        if !self.attachments.is_empty() {
            tracing::debug!(message_id = %self.message_id, files = self.attachments.len(), "removing attachments");
        }
    }
}
