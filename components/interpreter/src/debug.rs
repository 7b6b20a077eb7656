//! Debugger attachment
//!
//! The dispatch loop calls two hooks when `debug_mode` is on and a
//! debugger is attached: [`DebugHooks::enter_function`] when a compiled
//! function starts running and [`DebugHooks::break_slot`] at every `Debug`
//! instruction. [`DebugAgent`] is the stock implementation: breakpoints
//! keyed by file and line, stepping, and a JSON command channel for a
//! front end.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Location reported to the hooks
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo<'a> {
    /// File name of the running unit
    pub file_name: &'a str,
    /// Name of the running function, empty when anonymous
    pub function_name: &'a str,
    /// Source line of the current instruction, 0 when unknown
    pub line: u32,
    /// Number of active script frames
    pub depth: usize,
}

/// Entry points the interpreter calls while debugging
pub trait DebugHooks {
    /// A compiled function started running.
    fn enter_function(&mut self, frame: &FrameInfo<'_>);

    /// Execution reached a potential breakpoint.
    fn break_slot(&mut self, frame: &FrameInfo<'_>);
}

/// Step granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    /// Stop at the next slot, entering calls
    In,
    /// Stop at the next slot in this frame or a caller
    Over,
    /// Stop at the next slot in a caller
    Out,
}

/// Why execution paused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseReason {
    /// Breakpoint with this id
    Breakpoint(i32),
    /// A prepared step completed
    Step,
}

/// Delivered to the pause handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseEvent {
    /// Cause
    pub reason: PauseReason,
    /// File name
    pub file_name: String,
    /// Function name
    pub function_name: String,
    /// Line
    pub line: u32,
    /// Frame depth
    pub depth: usize,
}

/// An installed breakpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// File name or path suffix
    pub full_name: String,
    /// 1-based line
    pub line: u32,
    /// Condition text handed to the evaluator
    pub condition: Option<String>,
}

impl Breakpoint {
    fn matches(&self, frame: &FrameInfo<'_>) -> bool {
        if self.line != frame.line {
            return false;
        }
        let file = frame.file_name;
        file == self.full_name
            || file
                .strip_suffix(self.full_name.as_str())
                .is_some_and(|prefix| prefix.ends_with('/'))
    }
}

type PauseHandler = Box<dyn FnMut(&PauseEvent) + Send>;
type ConditionEvaluator = Box<dyn FnMut(&str, &FrameInfo<'_>) -> bool + Send>;

/// Breakpoint and stepping state
///
/// # Example
///
/// ```
/// use interpreter::DebugAgent;
///
/// let mut agent = DebugAgent::new();
/// let reply = agent.handle_command(
///     r#"{"command":"insertBreakpoint","arguments":{"fullName":"main.js","lineNumber":3}}"#,
/// );
/// assert_eq!(reply, r#"{"command":"insertBreakpoint","result":0}"#);
/// ```
#[derive(Default)]
pub struct DebugAgent {
    breakpoints: BTreeMap<i32, Breakpoint>,
    next_id: i32,
    step: Option<(StepAction, usize)>,
    depth: usize,
    pauses: usize,
    on_pause: Option<PauseHandler>,
    evaluator: Option<ConditionEvaluator>,
}

/// Version reported by `protocolVersion`
pub const PROTOCOL_VERSION: i64 = 1;

const ERR_INVALID_ARGUMENTS: i64 = -1;
const ERR_UNKNOWN_BREAKPOINT: i64 = -2;
const ERR_UNKNOWN_COMMAND: i64 = -3;
const ERR_MALFORMED: i64 = -4;

#[derive(Deserialize)]
struct Request {
    command: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertBreakpointArgs {
    full_name: String,
    line_number: u32,
    #[serde(default)]
    condition: Option<String>,
}

#[derive(Deserialize)]
struct RemoveBreakpointArgs {
    id: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareStepArgs {
    step_action: StepAction,
}

impl DebugAgent {
    /// Agent with no breakpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Agent shared between the engine and a front end.
    pub fn shared() -> Arc<Mutex<DebugAgent>> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Called on every pause.
    pub fn set_pause_handler(&mut self, handler: impl FnMut(&PauseEvent) + Send + 'static) {
        self.on_pause = Some(Box::new(handler));
    }

    /// Decides whether a conditional breakpoint fires.
    pub fn set_condition_evaluator(
        &mut self,
        evaluator: impl FnMut(&str, &FrameInfo<'_>) -> bool + Send + 'static,
    ) {
        self.evaluator = Some(Box::new(evaluator));
    }

    /// Installs a breakpoint. Returns its id, or `None` for an empty file
    /// name or line 0.
    pub fn insert_breakpoint(&mut self, full_name: &str, line: u32, condition: Option<&str>) -> Option<i32> {
        if full_name.is_empty() || line == 0 {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.breakpoints.insert(
            id,
            Breakpoint {
                full_name: full_name.to_string(),
                line,
                condition: condition.filter(|c| !c.is_empty()).map(str::to_string),
            },
        );
        debug!(id, file = full_name, line, "breakpoint inserted");
        Some(id)
    }

    /// Removes a breakpoint. Returns whether it existed.
    pub fn remove_breakpoint(&mut self, id: i32) -> bool {
        self.breakpoints.remove(&id).is_some()
    }

    /// Installed breakpoints by id.
    pub fn breakpoints(&self) -> impl Iterator<Item = (i32, &Breakpoint)> {
        self.breakpoints.iter().map(|(id, bp)| (*id, bp))
    }

    /// Arms a step relative to the most recently reported frame.
    pub fn prepare_step(&mut self, action: StepAction) {
        self.step = Some((action, self.depth));
    }

    /// Number of pauses so far.
    pub fn pause_count(&self) -> usize {
        self.pauses
    }

    /// Handles one JSON command and returns the JSON reply.
    pub fn handle_command(&mut self, request: &str) -> String {
        let request: Request = match serde_json::from_str(request) {
            Ok(request) => request,
            Err(_) => return json!({ "command": "", "result": ERR_MALFORMED }).to_string(),
        };
        let arguments = request.arguments;
        let result = match request.command.as_str() {
            "protocolVersion" => PROTOCOL_VERSION,
            "insertBreakpoint" => match serde_json::from_value::<InsertBreakpointArgs>(arguments) {
                Ok(args) => self
                    .insert_breakpoint(&args.full_name, args.line_number, args.condition.as_deref())
                    .map_or(ERR_INVALID_ARGUMENTS, i64::from),
                Err(_) => ERR_INVALID_ARGUMENTS,
            },
            "removeBreakpoint" => match serde_json::from_value::<RemoveBreakpointArgs>(arguments) {
                Ok(args) if self.remove_breakpoint(args.id) => 0,
                _ => ERR_UNKNOWN_BREAKPOINT,
            },
            "prepareStep" => match serde_json::from_value::<PrepareStepArgs>(arguments) {
                Ok(args) => {
                    self.prepare_step(args.step_action);
                    0
                }
                Err(_) => ERR_INVALID_ARGUMENTS,
            },
            _ => ERR_UNKNOWN_COMMAND,
        };
        json!({ "command": request.command, "result": result }).to_string()
    }

    fn pause(&mut self, reason: PauseReason, frame: &FrameInfo<'_>) {
        self.pauses += 1;
        debug!(?reason, file = frame.file_name, line = frame.line, "paused");
        let event = PauseEvent {
            reason,
            file_name: frame.file_name.to_string(),
            function_name: frame.function_name.to_string(),
            line: frame.line,
            depth: frame.depth,
        };
        if let Some(handler) = self.on_pause.as_mut() {
            handler(&event);
        }
    }

    fn step_completes(&self, frame: &FrameInfo<'_>, entering: bool) -> bool {
        match self.step {
            Some((StepAction::In, _)) => true,
            Some((StepAction::Over, depth)) => !entering && frame.depth <= depth,
            Some((StepAction::Out, depth)) => !entering && frame.depth < depth,
            None => false,
        }
    }

    fn hit_breakpoint(&mut self, frame: &FrameInfo<'_>) -> Option<i32> {
        let candidates: Vec<(i32, Option<String>)> = self
            .breakpoints
            .iter()
            .filter(|(_, bp)| bp.matches(frame))
            .map(|(id, bp)| (*id, bp.condition.clone()))
            .collect();
        for (id, condition) in candidates {
            let fires = match (&condition, self.evaluator.as_mut()) {
                (Some(condition), Some(evaluator)) => evaluator(condition.as_str(), frame),
                _ => true,
            };
            if fires {
                return Some(id);
            }
        }
        None
    }
}

impl DebugHooks for DebugAgent {
    fn enter_function(&mut self, frame: &FrameInfo<'_>) {
        self.depth = frame.depth;
        if self.step_completes(frame, true) {
            self.step = None;
            self.pause(PauseReason::Step, frame);
        }
    }

    fn break_slot(&mut self, frame: &FrameInfo<'_>) {
        self.depth = frame.depth;
        if let Some(id) = self.hit_breakpoint(frame) {
            self.step = None;
            self.pause(PauseReason::Breakpoint(id), frame);
        } else if self.step_completes(frame, false) {
            self.step = None;
            self.pause(PauseReason::Step, frame);
        }
    }
}

impl DebugHooks for Arc<Mutex<DebugAgent>> {
    fn enter_function(&mut self, frame: &FrameInfo<'_>) {
        self.lock().enter_function(frame);
    }

    fn break_slot(&mut self, frame: &FrameInfo<'_>) {
        self.lock().break_slot(frame);
    }
}
