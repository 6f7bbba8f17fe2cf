use serde::Serialize;

use super::types::{Breakpoint, Capabilities, Scope, StackFrame, Thread, Variable};

/// An outgoing response. `seq` is stamped by the writer task just before
/// the message hits the wire.
#[derive(Clone, Debug, Serialize)]
pub struct Response {
    pub seq: i64,
    #[serde(rename = "type")]
    kind: &'static str,
    pub request_seq: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
}

impl Response {
    pub fn success(request_seq: i64, body: ResponseBody) -> Self {
        Self {
            seq: 0,
            kind: "response",
            request_seq,
            success: true,
            message: None,
            body: Some(body),
        }
    }

    pub fn error(request_seq: i64, message: &str) -> Self {
        Self {
            seq: 0,
            kind: "response",
            request_seq,
            success: false,
            message: Some(message.to_string()),
            body: None,
        }
    }
}

/// Success bodies. The adjacent tag re-emits the originating command name,
/// which is how the editor pairs bodies with requests besides `request_seq`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "command", content = "body", rename_all = "camelCase")]
pub enum ResponseBody {
    Initialize(Capabilities),
    Launch,
    Attach,
    SetBreakpoints(SetBreakpointsResponse),
    SetFunctionBreakpoints(SetBreakpointsResponse),
    ConfigurationDone,
    Threads(ThreadsResponse),
    StackTrace(StackTraceResponse),
    Scopes(ScopesResponse),
    Variables(VariablesResponse),
    Continue(ContinueResponse),
    Next,
    StepIn,
    StepOut,
    Pause,
    Evaluate(EvaluateResponse),
    Disconnect,
    Terminate,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponse {
    pub breakpoints: Vec<Breakpoint>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponse {
    pub threads: Vec<Thread>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponse {
    pub stack_frames: Vec<StackFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponse {
    pub scopes: Vec<Scope>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponse {
    pub variables: Vec<Variable>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_continued: Option<bool>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub result: String,
    pub variables_reference: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_body_carries_command_tag() {
        let response = Response::success(
            7,
            ResponseBody::Threads(ThreadsResponse {
                threads: vec![Thread {
                    id: 1,
                    name: "Vim script".to_string(),
                }],
            }),
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["command"], "threads");
        assert_eq!(value["request_seq"], 7);
        assert_eq!(value["success"], true);
        assert_eq!(value["body"]["threads"][0]["name"], "Vim script");
    }

    #[test]
    fn error_response_has_no_body() {
        let value = serde_json::to_value(Response::error(3, "not-stopped")).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "not-stopped");
        assert!(value.get("body").is_none());
    }
}
