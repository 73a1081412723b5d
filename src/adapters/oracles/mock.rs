//! Scripted oracle for tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::OracleKind;
use crate::domain::ports::Oracle;

type Handler = Arc<dyn Fn(&serde_json::Value) -> DomainResult<String> + Send + Sync>;

/// One canned reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text as the raw response.
    Text(String),
    /// Fail as if the oracle crashed.
    Crash(String),
}

impl MockReply {
    pub fn json(value: serde_json::Value) -> Self {
        Self::Text(value.to_string())
    }
}

/// Oracle whose answers are queued or computed by test code.
///
/// Per kind, queued replies are consumed first; once the queue is empty the
/// handler (if any) answers. With neither, the call fails as a crash.
#[derive(Clone, Default)]
pub struct MockOracle {
    name: String,
    queues: Arc<Mutex<HashMap<OracleKind, VecDeque<MockReply>>>>,
    handlers: Arc<Mutex<HashMap<OracleKind, Handler>>>,
    requests: Arc<Mutex<Vec<(OracleKind, serde_json::Value)>>>,
    resets: Arc<AtomicUsize>,
}

impl MockOracle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Queue a reply for the next call of `kind`.
    pub fn push_reply(&self, kind: OracleKind, reply: MockReply) -> &Self {
        if let Ok(mut queues) = self.queues.lock() {
            queues.entry(kind).or_default().push_back(reply);
        }
        self
    }

    /// Answer every call of `kind` not served by the queue.
    pub fn with_handler<F>(self, kind: OracleKind, handler: F) -> Self
    where
        F: Fn(&serde_json::Value) -> DomainResult<String> + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.insert(kind, Arc::new(handler));
        }
        self
    }

    /// Number of calls made for `kind`.
    pub fn calls(&self, kind: OracleKind) -> usize {
        self.requests
            .lock()
            .map(|r| r.iter().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }

    /// Requests received for `kind`, in call order.
    pub fn requests(&self, kind: OracleKind) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .map(|r| r.iter().filter(|(k, _)| *k == kind).map(|(_, v)| v.clone()).collect())
            .unwrap_or_default()
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for MockOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, kind: OracleKind, request: &serde_json::Value) -> DomainResult<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((kind, request.clone()));
        }

        let queued = self
            .queues
            .lock()
            .ok()
            .and_then(|mut q| q.get_mut(&kind).and_then(VecDeque::pop_front));
        if let Some(reply) = queued {
            return match reply {
                MockReply::Text(text) => Ok(text),
                MockReply::Crash(reason) => Err(DomainError::OracleTimeoutOrCrash {
                    oracle: self.name.clone(),
                    reason,
                }),
            };
        }

        let handler = self.handlers.lock().ok().and_then(|h| h.get(&kind).cloned());
        match handler {
            Some(handler) => handler(request),
            None => Err(DomainError::OracleTimeoutOrCrash {
                oracle: self.name.clone(),
                reason: format!("no scripted reply for {kind}"),
            }),
        }
    }

    async fn reset_session(&self) -> DomainResult<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_handler_then_crash() {
        let oracle = MockOracle::new("mock").with_handler(OracleKind::Test, |_| Ok("handled".to_string()));
        oracle.push_reply(OracleKind::Test, MockReply::Text("queued".to_string()));

        let req = serde_json::json!({});
        assert_eq!(oracle.invoke(OracleKind::Test, &req).await.unwrap(), "queued");
        assert_eq!(oracle.invoke(OracleKind::Test, &req).await.unwrap(), "handled");
        assert!(oracle.invoke(OracleKind::Merge, &req).await.is_err());
        assert_eq!(oracle.calls(OracleKind::Test), 2);
        assert_eq!(oracle.calls(OracleKind::Merge), 1);
    }
}
