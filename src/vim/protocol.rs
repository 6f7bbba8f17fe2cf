//! Wire model for the private channel between the bridge and the hook
//! running inside the Vim process.
//!
//! Every line is a JSON array. Addressed traffic is a two-element
//! `[id, payload]` envelope; raw `[mode, command]` pushes tell Vim to run
//! a command outside any envelope exchange.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::IntoStaticStr;

/// Envelope id used for correlator-driven requests; their pairing happens
/// through `request_id` in the arguments, not through the envelope.
pub const CORRELATED_REF: i64 = 0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageType {
    Notify,
    Request,
    Reply,
}

/// Operations the hook understands or initiates.
///
/// Unrecognized names land in `Unknown` instead of failing the line parse,
/// so a newer hook cannot take the whole channel down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookFunction {
    Initialize,
    GetCommand,
    Break,
    ClearLineBreakpoints,
    SetLineBreakpoint,
    StackTrace,
    Variables,
    Evaluate,
    Execute,
    Unknown(String),
}

impl HookFunction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialize => "Initialize",
            Self::GetCommand => "GetCommand",
            Self::Break => "Break",
            Self::ClearLineBreakpoints => "clearLineBreakpoints",
            Self::SetLineBreakpoint => "setLineBreakpoint",
            Self::StackTrace => "stackTrace",
            Self::Variables => "variables",
            Self::Evaluate => "evaluate",
            Self::Execute => "execute",
            Self::Unknown(name) => name,
        }
    }

    fn from_wire(name: &str) -> Self {
        match name {
            "Initialize" => Self::Initialize,
            "GetCommand" => Self::GetCommand,
            "Break" => Self::Break,
            "clearLineBreakpoints" => Self::ClearLineBreakpoints,
            "setLineBreakpoint" => Self::SetLineBreakpoint,
            "stackTrace" => Self::StackTrace,
            "variables" => Self::Variables,
            "evaluate" => Self::Evaluate,
            "execute" => Self::Execute,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl Serialize for HookFunction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HookFunction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&name))
    }
}

/// The payload half of an `[id, payload]` envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HookMessage {
    #[serde(rename = "Message_type")]
    pub message_type: MessageType,
    #[serde(rename = "Function")]
    pub function: HookFunction,
    #[serde(rename = "Arguments", default, skip_serializing_if = "Value::is_null")]
    pub arguments: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum PushMode {
    Ex,
    Normal,
}

/// Arguments of a `Notify`/`Break` message.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BreakNotification {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClearLineBreakpointsArguments {
    pub file: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetLineBreakpointArguments {
    pub file: String,
    pub line: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariablesArguments {
    pub level: i64,
    pub scope: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EvaluateArguments {
    pub expression: String,
    pub level: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecuteArguments {
    pub command: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FramesReply {
    pub frames: Vec<HookFrame>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HookFrame {
    pub level: i64,
    pub name: String,
    pub file: String,
    pub line: i64,
    pub kind: FrameKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Function,
    Script,
    Other,
}

impl<'de> Deserialize<'de> for FrameKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kind = String::deserialize(deserializer)?;
        Ok(match kind.as_str() {
            "function" => Self::Function,
            "script" => Self::Script,
            _ => Self::Other,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariablesReply {
    pub variables: Vec<HookVariable>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HookVariable {
    pub name: String,
    #[serde(default)]
    pub r#type: String,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EvaluationReply {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let line = r#"[7,{"Message_type":"Request","Function":"GetCommand"}]"#;
        let (id, message): (i64, HookMessage) = serde_json::from_str(line).unwrap();
        assert_eq!(id, 7);
        assert_eq!(message.message_type, MessageType::Request);
        assert_eq!(message.function, HookFunction::GetCommand);
        assert!(message.arguments.is_null());
    }

    #[test]
    fn reply_serializes_without_null_arguments() {
        let message = HookMessage {
            message_type: MessageType::Reply,
            function: HookFunction::GetCommand,
            arguments: serde_json::json!({ "Command": "next" }),
        };
        let line = serde_json::to_string(&(7, message)).unwrap();
        assert_eq!(
            line,
            r#"[7,{"Message_type":"Reply","Function":"GetCommand","Arguments":{"Command":"next"}}]"#
        );
    }

    #[test]
    fn unknown_function_parses_to_catch_all() {
        let line = r#"[3,{"Message_type":"Notify","Function":"somethingNew","Arguments":{}}]"#;
        let (_, message): (i64, HookMessage) = serde_json::from_str(line).unwrap();
        assert_eq!(
            message.function,
            HookFunction::Unknown("somethingNew".to_string())
        );
    }

    #[test]
    fn break_notification_fields() {
        let raw = r#"{"Reason":"breakpoint","File":"/tmp/a.vim","Line":12}"#;
        let parsed: BreakNotification = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.reason.as_deref(), Some("breakpoint"));
        assert_eq!(parsed.line, Some(12));
    }
}
