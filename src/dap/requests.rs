use serde::{de, Deserialize};
use serde_json::Value;

use super::types::{FunctionBreakpoint, Source, SourceBreakpoint};

/// An incoming editor request. `seq` is echoed back as `request_seq`.
#[derive(Clone, Debug)]
pub struct Request {
    pub seq: i64,
    pub command: Command,
}

/// Wire shape before the command name is resolved.
#[derive(Deserialize)]
struct RawRequest {
    seq: i64,
    command: String,
    #[serde(default)]
    arguments: Option<Value>,
}

// Decoding happens in two steps (name first, then typed arguments) so an
// unrecognized command still parses into `Command::Unknown` whether or
// not it carries arguments; a tagged enum would reject the arguments
// object outright.
impl<'de> Deserialize<'de> for Request {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawRequest::deserialize(deserializer)?;
        let command = Command::decode(&raw.command, raw.arguments).map_err(de::Error::custom)?;
        Ok(Self {
            seq: raw.seq,
            command,
        })
    }
}

/// The implemented slice of the DAP request surface.
///
/// Commands the bridge does not implement decode to the catch-all
/// variant so one exotic request cannot poison the read loop.
#[derive(Clone, Debug)]
pub enum Command {
    Initialize(InitializeArguments),
    Launch(LaunchArguments),
    Attach(AttachArguments),
    SetBreakpoints(SetBreakpointsArguments),
    SetFunctionBreakpoints(SetFunctionBreakpointsArguments),
    ConfigurationDone,
    Threads,
    StackTrace(StackTraceArguments),
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    Continue(ContinueArguments),
    Next(NextArguments),
    StepIn(StepInArguments),
    StepOut(StepOutArguments),
    Pause(PauseArguments),
    Evaluate(EvaluateArguments),
    Disconnect(DisconnectArguments),
    Terminate(TerminateArguments),
    Unknown,
}

impl Command {
    fn decode(name: &str, arguments: Option<Value>) -> Result<Self, serde_json::Error> {
        // Missing arguments decode like an empty object, so commands
        // whose argument fields are all optional accept both shapes.
        fn args<T: de::DeserializeOwned>(
            arguments: Option<Value>,
        ) -> Result<T, serde_json::Error> {
            serde_json::from_value(arguments.unwrap_or_else(|| Value::Object(Default::default())))
        }

        Ok(match name {
            "initialize" => Self::Initialize(args(arguments)?),
            "launch" => Self::Launch(args(arguments)?),
            "attach" => Self::Attach(args(arguments)?),
            "setBreakpoints" => Self::SetBreakpoints(args(arguments)?),
            "setFunctionBreakpoints" => Self::SetFunctionBreakpoints(args(arguments)?),
            "configurationDone" => Self::ConfigurationDone,
            "threads" => Self::Threads,
            "stackTrace" => Self::StackTrace(args(arguments)?),
            "scopes" => Self::Scopes(args(arguments)?),
            "variables" => Self::Variables(args(arguments)?),
            "continue" => Self::Continue(args(arguments)?),
            "next" => Self::Next(args(arguments)?),
            "stepIn" => Self::StepIn(args(arguments)?),
            "stepOut" => Self::StepOut(args(arguments)?),
            "pause" => Self::Pause(args(arguments)?),
            "evaluate" => Self::Evaluate(args(arguments)?),
            "disconnect" => Self::Disconnect(args(arguments)?),
            "terminate" => Self::Terminate(args(arguments)?),
            _ => Self::Unknown,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct InitializeArguments {
    #[serde(rename = "clientID")]
    pub client_id: Option<String>,
    #[serde(rename = "adapterID")]
    pub adapter_id: Option<String>,
    #[serde(rename = "linesStartAt1")]
    pub lines_start_at1: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    #[serde(default)]
    pub no_debug: Option<bool>,
    #[serde(default)]
    pub program: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AttachArguments {
    #[serde(default)]
    pub __restart: Option<Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
    /// Deprecated spelling some clients still send.
    #[serde(default)]
    pub lines: Option<Vec<i64>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SetFunctionBreakpointsArguments {
    pub breakpoints: Vec<FunctionBreakpoint>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    pub thread_id: i64,
    #[serde(default)]
    pub start_frame: Option<i64>,
    #[serde(default)]
    pub levels: Option<i64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    pub frame_id: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueArguments {
    pub thread_id: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextArguments {
    pub thread_id: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInArguments {
    pub thread_id: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutArguments {
    pub thread_id: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseArguments {
    pub thread_id: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(default)]
    pub frame_id: Option<i64>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(default)]
    pub terminate_debuggee: Option<bool>,
    #[serde(default)]
    pub restart: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateArguments {
    #[serde(default)]
    pub restart: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_initialize() {
        let raw = r#"{"seq":1,"type":"request","command":"initialize","arguments":{"clientID":"vscode","adapterID":"vimscript","linesStartAt1":true}}"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(request.seq, 1);
        let Command::Initialize(args) = request.command else {
            panic!("wrong command");
        };
        assert_eq!(args.adapter_id.as_deref(), Some("vimscript"));
    }

    #[test]
    fn parses_set_breakpoints() {
        let raw = r#"{"seq":4,"type":"request","command":"setBreakpoints","arguments":{"source":{"path":"/tmp/a.vim"},"breakpoints":[{"line":3},{"line":9}]}}"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        let Command::SetBreakpoints(args) = request.command else {
            panic!("wrong command");
        };
        assert_eq!(args.source.path.as_deref(), Some("/tmp/a.vim"));
        let lines: Vec<_> = args.breakpoints.unwrap().iter().map(|b| b.line).collect();
        assert_eq!(lines, [3, 9]);
    }

    #[test]
    fn unknown_command_still_parses() {
        let raw = r#"{"seq":9,"type":"request","command":"readMemory","arguments":{"memoryReference":"0x0"}}"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        assert!(matches!(request.command, Command::Unknown));

        // Also without arguments.
        let raw = r#"{"seq":10,"type":"request","command":"restart"}"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        assert!(matches!(request.command, Command::Unknown));
    }

    #[test]
    fn unit_commands_tolerate_an_arguments_object() {
        let raw = r#"{"seq":5,"type":"request","command":"configurationDone","arguments":{}}"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        assert!(matches!(request.command, Command::ConfigurationDone));
    }

    #[test]
    fn optional_arguments_may_be_omitted() {
        let raw = r#"{"seq":6,"type":"request","command":"disconnect"}"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        let Command::Disconnect(arguments) = request.command else {
            panic!("wrong command");
        };
        assert_eq!(arguments.terminate_debuggee, None);
    }
}
