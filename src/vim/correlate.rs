//! Request/reply correlation over the hook channel.
//!
//! Requests ride envelope id `0`; pairing happens through a `request_id`
//! the correlator stamps into the arguments and the hook echoes back in
//! its reply.

use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Mutex,
    },
    time::Duration,
};

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{
    link::Link,
    protocol::{HookFunction, HookMessage, MessageType, CORRELATED_REF},
};

#[derive(Debug, Error)]
pub enum CallError {
    #[error("connection to the interpreter closed")]
    LinkClosed,
    #[error("the interpreter did not reply within {0:?}")]
    Timeout(Duration),
    #[error("failed to encode hook request: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct Correlator {
    next_id: AtomicI64,
    timeout: Duration,
    pending: Mutex<FxHashMap<i64, oneshot::Sender<Value>>>,
}

impl Correlator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            timeout,
            pending: Mutex::new(FxHashMap::default()),
        }
    }

    /// Sends one request and waits for its reply. The future is armed
    /// before the request is written, so a reply can never race past its
    /// waiter.
    pub async fn call(
        &self,
        link: &Link,
        function: HookFunction,
        arguments: impl serde::Serialize,
    ) -> Result<Value, CallError> {
        let mut arguments = match serde_json::to_value(arguments)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("Value".to_string(), other);
                map
            }
        };
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        arguments.insert("request_id".to_string(), Value::from(request_id));

        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(request_id, sender);

        link.send(
            CORRELATED_REF,
            &HookMessage {
                message_type: MessageType::Request,
                function,
                arguments: Value::Object(arguments),
            },
        );

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(CallError::LinkClosed),
            Err(_) => {
                self.pending
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .remove(&request_id);
                Err(CallError::Timeout(self.timeout))
            }
        }
    }

    /// Routes a `Reply` payload to its waiter. Replies without a known
    /// `request_id` are dropped; a late reply after a timeout is normal.
    pub fn dispatch_reply(&self, arguments: &Value) {
        let Some(request_id) = arguments.get("request_id").and_then(Value::as_i64) else {
            warn!("reply without request_id, dropping");
            return;
        };
        let waiter = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&request_id);
        match waiter {
            Some(sender) => {
                let _ = sender.send(arguments.clone());
            }
            None => debug!(request_id, "stale reply, dropping"),
        }
    }

    /// Fails every in-flight call. Must run on disconnect so no caller
    /// waits out its full timeout against a dead channel.
    pub fn fail_all(&self) {
        let drained = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        if !drained.is_empty() {
            debug!(count = drained.len(), "failing in-flight hook requests");
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn loopback_link() -> (Link, tokio::io::DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(16 * 1024);
        (Link::start(ours), theirs)
    }

    #[tokio::test]
    async fn replies_resolve_out_of_order() {
        let correlator = std::sync::Arc::new(Correlator::new(Duration::from_secs(5)));
        let (link, _remote) = loopback_link();

        let calls: Vec<_> = (0..16)
            .map(|index| {
                let correlator = correlator.clone();
                let link = link.clone();
                tokio::spawn(async move {
                    correlator
                        .call(
                            &link,
                            HookFunction::Evaluate,
                            serde_json::json!({ "Expression": format!("g:x{index}") }),
                        )
                        .await
                })
            })
            .collect();
        while correlator.pending_count() < 16 {
            tokio::task::yield_now().await;
        }

        // Ids are handed out in order starting at 1.
        let mut ids: Vec<i64> = (1..=16).collect();
        ids.shuffle(&mut rand::thread_rng());
        for id in ids {
            correlator.dispatch_reply(&serde_json::json!({
                "request_id": id,
                "Result": id.to_string(),
            }));
        }

        for (index, call) in calls.into_iter().enumerate() {
            let reply = call.await.unwrap().unwrap();
            assert_eq!(reply["request_id"], (index + 1) as i64);
            assert_eq!(reply["Result"], (index + 1).to_string());
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn stale_reply_is_dropped() {
        let correlator = Correlator::new(Duration::from_secs(5));
        correlator.dispatch_reply(&serde_json::json!({ "request_id": 99, "Result": "?" }));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn call_times_out_and_unregisters() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let (link, _remote) = loopback_link();
        let error = correlator
            .call(&link, HookFunction::StackTrace, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, CallError::Timeout(_)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn fail_all_wakes_every_waiter() {
        let correlator = std::sync::Arc::new(Correlator::new(Duration::from_secs(5)));
        let (link, _remote) = loopback_link();

        let pending: Vec<_> = (0..4)
            .map(|_| {
                let correlator = correlator.clone();
                let link = link.clone();
                tokio::spawn(async move {
                    correlator
                        .call(&link, HookFunction::Variables, serde_json::json!({}))
                        .await
                })
            })
            .collect();
        while correlator.pending_count() < 4 {
            tokio::task::yield_now().await;
        }

        correlator.fail_all();
        for handle in pending {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(CallError::LinkClosed)));
        }
    }
}
