//! The bridge's core: one `DebugSession` per process, terminating DAP on
//! one side and driving the Vim hook on the other.

pub mod breakpoints;
pub mod paused;
pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use itertools::Itertools;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    dap::{
        events::{EventBody, OutputEventBody, StoppedEventBody},
        requests::{
            Command, EvaluateArguments, Request, ScopesArguments, SetBreakpointsArguments,
            SetFunctionBreakpointsArguments, StackTraceArguments, VariablesArguments,
        },
        responses::{
            ContinueResponse, EvaluateResponse, Response, ResponseBody, ScopesResponse,
            SetBreakpointsResponse, StackTraceResponse, ThreadsResponse, VariablesResponse,
        },
        types::{
            Breakpoint, Capabilities, Scope, Source, StackFrame, StoppedReason, Thread, Variable,
        },
        EditorClient,
    },
    vim::{
        correlate::{CallError, Correlator},
        link::Link,
        protocol as wire,
        protocol::{BreakNotification, HookFunction, HookMessage, MessageType, PushMode},
    },
    BridgeConfig,
};
use paused::{ReferenceTable, ScopeCode};
use state::{ExecutionState, SessionFlow, SlotKind, StepCommand};

/// Vim script runs on one interpreter thread; DAP still wants an id.
const THREAD_ID: i64 = 1;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no hook connection")]
    NotConnected,
    #[error("the interpreter is not stopped")]
    NotStopped,
    #[error("the session is not waiting for configuration")]
    NotConfiguring,
    #[error("the interpreter is not running")]
    NotRunning,
    #[error("unknown variables reference {0}")]
    UnknownReference(i64),
    #[error("no stack frame with id {0}")]
    FrameNotFound(i64),
    #[error("breakpoint source carries no path")]
    SourceMissing,
    #[error("unsupported request")]
    Unsupported,
    #[error(transparent)]
    Call(#[from] CallError),
    #[error("malformed hook reply: {0}")]
    MalformedReply(#[source] serde_json::Error),
}

impl SessionError {
    /// Stable code reported to the editor; details go to the log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "notConnected",
            Self::NotStopped => "notStopped",
            Self::NotConfiguring => "notConfiguring",
            Self::NotRunning => "notRunning",
            Self::UnknownReference(_) => "invalidVariablesReference",
            Self::FrameNotFound(_) => "frameNotFound",
            Self::SourceMissing => "sourceMissing",
            Self::Unsupported => "unsupported",
            Self::Call(CallError::LinkClosed) => "connectionClosed",
            Self::Call(CallError::Timeout(_)) => "requestTimeout",
            Self::Call(CallError::Encode(_)) => "internalError",
            Self::MalformedReply(_) => "malformedReply",
        }
    }
}

#[derive(Debug)]
pub struct DebugSession {
    editor: EditorClient,
    config: BridgeConfig,
    correlator: Correlator,
    flow: Mutex<SessionFlow>,
    references: Mutex<ReferenceTable>,
}

impl DebugSession {
    pub fn new(editor: EditorClient, config: BridgeConfig) -> Self {
        let correlator = Correlator::new(config.request_timeout);
        Self {
            editor,
            config,
            correlator,
            flow: Mutex::new(SessionFlow::default()),
            references: Mutex::new(ReferenceTable::default()),
        }
    }

    /// Handles one editor request to completion.
    pub async fn handle(self: &Arc<Self>, request: Request) -> Response {
        let request_seq = request.seq;
        let result = match request.command {
            Command::Initialize(_) => Ok(ResponseBody::Initialize(Self::capabilities())),
            Command::Launch(_) => self.start(true),
            Command::Attach(_) => self.start(false),
            Command::SetBreakpoints(arguments) => self.set_breakpoints(arguments).await,
            Command::SetFunctionBreakpoints(arguments) => {
                Ok(Self::function_breakpoints(&arguments))
            }
            Command::ConfigurationDone => self.configuration_done(),
            Command::Threads => Ok(ResponseBody::Threads(ThreadsResponse {
                threads: vec![Thread {
                    id: THREAD_ID,
                    name: "Vim script".to_string(),
                }],
            })),
            Command::StackTrace(arguments) => self.stack_trace(arguments).await,
            Command::Scopes(arguments) => self.scopes(arguments).await,
            Command::Variables(arguments) => self.variables(arguments).await,
            Command::Continue(_) => self.resume(StepCommand::Continue).map(|()| {
                ResponseBody::Continue(ContinueResponse {
                    all_threads_continued: Some(true),
                })
            }),
            Command::Next(_) => self.resume(StepCommand::Next).map(|()| ResponseBody::Next),
            Command::StepIn(_) => self
                .resume(StepCommand::StepIn)
                .map(|()| ResponseBody::StepIn),
            Command::StepOut(_) => self
                .resume(StepCommand::StepOut)
                .map(|()| ResponseBody::StepOut),
            Command::Pause(_) => self.pause(),
            Command::Evaluate(arguments) => self.evaluate(arguments).await,
            Command::Disconnect(_) => {
                self.shutdown();
                Ok(ResponseBody::Disconnect)
            }
            Command::Terminate(_) => {
                self.shutdown();
                Ok(ResponseBody::Terminate)
            }
            Command::Unknown => Err(SessionError::Unsupported),
        };
        match result {
            Ok(body) => Response::success(request_seq, body),
            Err(error) => {
                warn!(%error, request_seq, "request failed");
                Response::error(request_seq, error.code())
            }
        }
    }

    fn capabilities() -> Capabilities {
        Capabilities {
            supports_configuration_done_request: Some(true),
            supports_function_breakpoints: Some(true),
            supports_evaluate_for_hovers: Some(true),
            supports_terminate_request: Some(true),
        }
    }

    /// Launch and attach are the same to the bridge except for the
    /// shutdown policy: the hook connects on its own either way. A
    /// watchdog reports if it never does.
    fn start(self: &Arc<Self>, spawned: bool) -> Result<ResponseBody, SessionError> {
        self.lock_flow().spawned = spawned;

        let session = Arc::clone(self);
        let deadline = self.config.handshake_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let stalled = matches!(
                session.lock_flow().state,
                ExecutionState::Disconnected | ExecutionState::AwaitingInit
            );
            if stalled {
                warn!("hook handshake timed out");
                session.editor.event(EventBody::Output(OutputEventBody {
                    category: Some("console".to_string()),
                    output: format!(
                        "No connection from the Vim hook within {}s; giving up.\n",
                        deadline.as_secs()
                    ),
                }));
                session.editor.event(EventBody::Terminated);
            }
        });

        Ok(if spawned {
            ResponseBody::Launch
        } else {
            ResponseBody::Attach
        })
    }

    async fn set_breakpoints(
        &self,
        arguments: SetBreakpointsArguments,
    ) -> Result<ResponseBody, SessionError> {
        let file = arguments
            .source
            .path
            .clone()
            .ok_or(SessionError::SourceMissing)?;
        let requested = arguments.breakpoints.unwrap_or_else(|| {
            arguments
                .lines
                .unwrap_or_default()
                .into_iter()
                .map(|line| crate::dap::types::SourceBreakpoint {
                    line,
                    condition: None,
                })
                .collect()
        });
        let lines = requested.iter().map(|breakpoint| breakpoint.line).collect_vec();

        let link = self.link()?;
        breakpoints::apply_line_breakpoints(&self.correlator, &link, &file, &lines).await?;

        // The interpreter accepts any line, so everything is reported
        // verified; misplaced breakpoints simply never fire.
        let breakpoints = requested
            .into_iter()
            .map(|breakpoint| Breakpoint {
                verified: true,
                line: Some(breakpoint.line),
                message: breakpoint
                    .condition
                    .is_some()
                    .then(|| "conditions are ignored; the Vim debugger stops unconditionally".to_string()),
                source: Some(arguments.source.clone()),
            })
            .collect();
        Ok(ResponseBody::SetBreakpoints(SetBreakpointsResponse {
            breakpoints,
        }))
    }

    /// Function breakpoints have no interpreter counterpart; they are
    /// echoed back unverified so the editor shows them as pending.
    fn function_breakpoints(arguments: &SetFunctionBreakpointsArguments) -> ResponseBody {
        let breakpoints = arguments
            .breakpoints
            .iter()
            .map(|_| Breakpoint {
                verified: false,
                line: None,
                message: Some("function breakpoints are not supported".to_string()),
                source: None,
            })
            .collect();
        ResponseBody::SetFunctionBreakpoints(SetBreakpointsResponse { breakpoints })
    }

    fn configuration_done(&self) -> Result<ResponseBody, SessionError> {
        let mut flow = self.lock_flow();
        if flow.state != ExecutionState::Ready {
            return Err(SessionError::NotConfiguring);
        }
        let slot = flow
            .close_slot(SlotKind::Initialize)
            .map_err(|_| SessionError::NotConfiguring)?;
        let link = flow.link.as_ref().ok_or(SessionError::NotConnected)?;
        link.reply(
            slot.envelope_id,
            HookFunction::Initialize,
            json!({ "Command": "cont" }),
        );
        flow.state = ExecutionState::Running;
        info!("configuration done, interpreter released");
        Ok(ResponseBody::ConfigurationDone)
    }

    async fn stack_trace(
        &self,
        arguments: StackTraceArguments,
    ) -> Result<ResponseBody, SessionError> {
        let link = self.paused_link()?;
        let frames = self.fetch_frames(&link).await?;
        let total_frames = frames.len() as i64;

        let start = arguments.start_frame.unwrap_or(0).max(0) as usize;
        let mut selected = frames.into_iter().skip(start).collect_vec();
        if let Some(levels) = arguments.levels {
            if levels > 0 {
                selected.truncate(levels as usize);
            }
        }

        let stack_frames = selected
            .into_iter()
            .map(|frame| {
                let name = std::path::Path::new(&frame.file)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
                StackFrame {
                    id: frame.level,
                    name: frame.name,
                    source: Some(Source {
                        name,
                        path: Some(frame.file),
                    }),
                    line: frame.line,
                    column: 1,
                }
            })
            .collect_vec();
        Ok(ResponseBody::StackTrace(StackTraceResponse {
            stack_frames,
            total_frames: Some(total_frames),
        }))
    }

    async fn scopes(&self, arguments: ScopesArguments) -> Result<ResponseBody, SessionError> {
        let link = self.paused_link()?;
        // Frames are never cached; the frame's kind decides whether a
        // Local scope exists, so ask the hook again.
        let frames = self.fetch_frames(&link).await?;
        let frame = frames
            .iter()
            .find(|frame| frame.level == arguments.frame_id)
            .ok_or(SessionError::FrameNotFound(arguments.frame_id))?;

        let issued = self.lock_references().scopes_for(frame.kind, frame.level);
        let scopes = issued
            .into_iter()
            .map(|(handle, scope)| Scope {
                name: scope.title().to_string(),
                presentation_hint: (scope == ScopeCode::Local).then(|| "locals".to_string()),
                variables_reference: handle,
                expensive: false,
            })
            .collect_vec();
        Ok(ResponseBody::Scopes(ScopesResponse { scopes }))
    }

    async fn variables(&self, arguments: VariablesArguments) -> Result<ResponseBody, SessionError> {
        let link = self.paused_link()?;
        let reference = self
            .lock_references()
            .resolve(arguments.variables_reference)
            .ok_or(SessionError::UnknownReference(
                arguments.variables_reference,
            ))?;

        let reply = self
            .correlator
            .call(
                &link,
                HookFunction::Variables,
                wire::VariablesArguments {
                    level: reference.stack_level,
                    scope: reference.scope.wire_name().to_string(),
                },
            )
            .await?;
        let parsed: wire::VariablesReply =
            serde_json::from_value(reply).map_err(SessionError::MalformedReply)?;

        let variables = parsed
            .variables
            .into_iter()
            .map(|variable| Variable {
                name: variable.name,
                type_field: (!variable.r#type.is_empty()).then_some(variable.r#type),
                value: variable.value,
                variables_reference: 0,
            })
            .collect_vec();
        Ok(ResponseBody::Variables(VariablesResponse { variables }))
    }

    fn resume(&self, command: StepCommand) -> Result<(), SessionError> {
        let mut flow = self.lock_flow();
        if flow.state != ExecutionState::Paused {
            return Err(SessionError::NotStopped);
        }
        let slot = flow
            .close_slot(SlotKind::GetCommand)
            .map_err(|_| SessionError::NotStopped)?;
        let link = flow.link.as_ref().ok_or(SessionError::NotConnected)?;
        link.reply(
            slot.envelope_id,
            HookFunction::GetCommand,
            json!({ "Command": command.as_str() }),
        );
        flow.state = ExecutionState::Running;
        flow.pending_break = None;
        debug!(command = command.as_str(), "interpreter resumed");
        Ok(())
    }

    fn pause(&self) -> Result<ResponseBody, SessionError> {
        let flow = self.lock_flow();
        match flow.state {
            // Already stopped; the editor will learn that from the
            // stopped event it has seen or is about to see.
            ExecutionState::Paused => Ok(ResponseBody::Pause),
            ExecutionState::Running => {
                let link = flow.link.as_ref().ok_or(SessionError::NotConnected)?;
                link.push(PushMode::Ex, "breakint");
                Ok(ResponseBody::Pause)
            }
            _ => Err(SessionError::NotRunning),
        }
    }

    async fn evaluate(&self, arguments: EvaluateArguments) -> Result<ResponseBody, SessionError> {
        let link = self.paused_link()?;
        let reply = if arguments.context.as_deref() == Some("repl") {
            self.correlator
                .call(
                    &link,
                    HookFunction::Execute,
                    wire::ExecuteArguments {
                        command: arguments.expression,
                    },
                )
                .await?
        } else {
            self.correlator
                .call(
                    &link,
                    HookFunction::Evaluate,
                    wire::EvaluateArguments {
                        expression: arguments.expression,
                        level: arguments.frame_id.unwrap_or(0),
                    },
                )
                .await?
        };
        let parsed: wire::EvaluationReply =
            serde_json::from_value(reply).map_err(SessionError::MalformedReply)?;
        // An interpreter-side failure is still an answer; surface the
        // text instead of erroring the whole request.
        let result = parsed.result.or(parsed.error).unwrap_or_default();
        Ok(ResponseBody::Evaluate(EvaluateResponse {
            result,
            variables_reference: 0,
        }))
    }

    /// Winds the session down. Spawned interpreters are quit outright;
    /// attached ones only get the debugger released.
    pub fn shutdown(&self) {
        let mut flow = self.lock_flow();
        if flow.state == ExecutionState::Terminated {
            return;
        }
        let mut replied_quit = false;
        if let Ok(slot) = flow.close_slot(SlotKind::GetCommand) {
            if let Some(link) = &flow.link {
                link.reply(
                    slot.envelope_id,
                    HookFunction::GetCommand,
                    json!({ "Command": StepCommand::Quit.as_str() }),
                );
                replied_quit = true;
            }
        }
        if let Some(link) = &flow.link {
            if flow.spawned {
                link.push(PushMode::Ex, "qa!");
            } else if !replied_quit {
                link.push(PushMode::Ex, "quit");
            }
        }
        flow.state = ExecutionState::Terminated;
        flow.reset_slot();
        flow.pending_break = None;
        drop(flow);
        self.correlator.fail_all();
        info!("session terminated");
    }

    // ---- hook side -------------------------------------------------

    pub fn on_link_connected(&self, link: Link) -> bool {
        let mut flow = self.lock_flow();
        if flow.state != ExecutionState::Disconnected {
            warn!(state = %flow.state, "refusing hook connection");
            return false;
        }
        flow.link = Some(link);
        flow.state = ExecutionState::AwaitingInit;
        true
    }

    pub fn on_link_closed(&self) {
        let mut flow = self.lock_flow();
        flow.link = None;
        flow.reset_slot();
        flow.pending_break = None;
        let previous = std::mem::replace(&mut flow.state, ExecutionState::Terminated);
        drop(flow);
        self.correlator.fail_all();
        if previous != ExecutionState::Terminated {
            self.editor.event(EventBody::Terminated);
        }
    }

    pub fn handle_hook_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        debug!(%line, "<- hook");
        match serde_json::from_str::<(i64, HookMessage)>(line) {
            Ok((envelope_id, message)) => self.handle_hook_message(envelope_id, message),
            Err(error) => warn!(%error, %line, "dropping malformed hook record"),
        }
    }

    fn handle_hook_message(&self, envelope_id: i64, message: HookMessage) {
        match message.message_type {
            MessageType::Reply => self.correlator.dispatch_reply(&message.arguments),
            MessageType::Notify => match message.function {
                HookFunction::Break => self.on_break(message.arguments),
                other => warn!(function = other.as_str(), "unexpected notify"),
            },
            MessageType::Request => match message.function {
                HookFunction::Initialize => self.on_initialize_poll(envelope_id),
                HookFunction::GetCommand => self.on_get_command_poll(envelope_id),
                other => warn!(function = other.as_str(), "unexpected hook request"),
            },
        }
    }

    fn on_break(&self, arguments: Value) {
        match serde_json::from_value::<BreakNotification>(arguments) {
            Ok(notification) => {
                debug!(?notification, "break notification");
                self.lock_flow().pending_break = notification.reason;
            }
            Err(error) => warn!(%error, "malformed break notification"),
        }
    }

    fn on_initialize_poll(&self, envelope_id: i64) {
        let mut flow = self.lock_flow();
        if flow.state != ExecutionState::AwaitingInit {
            warn!(state = %flow.state, "ignoring Initialize poll");
            return;
        }
        if let Err(error) = flow.open_slot(envelope_id, SlotKind::Initialize) {
            warn!(%error, "ignoring Initialize poll");
            return;
        }
        flow.state = ExecutionState::Ready;
        drop(flow);
        info!("hook initialized");
        self.editor.event(EventBody::Initialized);
    }

    fn on_get_command_poll(&self, envelope_id: i64) {
        let mut flow = self.lock_flow();
        if flow.state != ExecutionState::Running {
            warn!(state = %flow.state, "rejecting GetCommand poll");
            return;
        }
        if let Err(error) = flow.open_slot(envelope_id, SlotKind::GetCommand) {
            warn!(%error, "rejecting GetCommand poll");
            return;
        }
        flow.state = ExecutionState::Paused;
        let reason_text = flow.pending_break.take();
        drop(flow);

        self.lock_references().recycle();
        self.editor.event(EventBody::Stopped(StoppedEventBody {
            reason: stop_reason(reason_text.as_deref()),
            description: reason_text,
            thread_id: THREAD_ID,
            all_threads_stopped: true,
        }));
    }

    // ---- plumbing --------------------------------------------------

    fn link(&self) -> Result<Link, SessionError> {
        self.lock_flow()
            .link
            .clone()
            .ok_or(SessionError::NotConnected)
    }

    fn paused_link(&self) -> Result<Link, SessionError> {
        let flow = self.lock_flow();
        if flow.state != ExecutionState::Paused {
            return Err(SessionError::NotStopped);
        }
        flow.link.clone().ok_or(SessionError::NotConnected)
    }

    async fn fetch_frames(&self, link: &Link) -> Result<Vec<wire::HookFrame>, SessionError> {
        let reply = self
            .correlator
            .call(link, HookFunction::StackTrace, json!({}))
            .await?;
        let parsed: wire::FramesReply =
            serde_json::from_value(reply).map_err(SessionError::MalformedReply)?;
        Ok(parsed.frames)
    }

    fn lock_flow(&self) -> MutexGuard<'_, SessionFlow> {
        self.flow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_references(&self) -> MutexGuard<'_, ReferenceTable> {
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Maps the hook's break reason onto DAP's stop-reason vocabulary. A stop
/// with no preceding `Break` notification is a plain pause.
fn stop_reason(reason: Option<&str>) -> StoppedReason {
    match reason {
        Some("breakpoint") => StoppedReason::Breakpoint,
        Some("step" | "line") => StoppedReason::Step,
        Some("exception" | "error" | "throw") => StoppedReason::Exception,
        Some("entry") => StoppedReason::Entry,
        _ => StoppedReason::Pause,
    }
}
