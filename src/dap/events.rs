use serde::Serialize;

use super::types::StoppedReason;

#[derive(Clone, Debug, Serialize)]
pub struct Event {
    pub seq: i64,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    pub body: EventBody,
}

impl Event {
    pub fn new(body: EventBody) -> Self {
        Self {
            seq: 0,
            kind: "event",
            body,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "body", rename_all = "camelCase")]
pub enum EventBody {
    Initialized,
    Stopped(StoppedEventBody),
    Terminated,
    Output(OutputEventBody),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: StoppedReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub thread_id: i64,
    pub all_threads_stopped: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_event_wire_shape() {
        let event = Event::new(EventBody::Stopped(StoppedEventBody {
            reason: StoppedReason::Breakpoint,
            description: None,
            thread_id: 1,
            all_threads_stopped: true,
        }));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"], "stopped");
        assert_eq!(value["body"]["reason"], "breakpoint");
        assert_eq!(value["body"]["allThreadsStopped"], true);
    }

    #[test]
    fn initialized_event_has_no_body() {
        let value = serde_json::to_value(Event::new(EventBody::Initialized)).unwrap();
        assert_eq!(value["event"], "initialized");
        assert!(value.get("body").is_none());
    }
}
