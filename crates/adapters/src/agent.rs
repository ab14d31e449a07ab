// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent invocation contract (spec §6 "Agent invocation contract").
//!
//! The external agent SDK, hidden browser, and OAuth/token storage are
//! out of scope; this module defines only the trait boundary and a test
//! double. A real implementation lives outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// A single `on_report` call from the agent (spec §6, item 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCall {
    #[serde(rename = "type")]
    pub kind: ReportKind,
    pub summary: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    RunComplete,
    RunSkipped,
    Milestone,
    Escalation,
    Output,
}

/// Returned by `on_report`; for `escalation` reports the caller must end
/// the run once this resolves.
#[derive(Debug, Clone)]
pub struct ReportAck {
    pub entry_id: String,
    pub must_end_run: bool,
}

/// Callback surface the agent uses to report progress back into the run
/// engine (spec §6, item 1). Implemented by the run engine, consumed by
/// the agent adapter.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn on_report(&self, call: ReportCall) -> ReportAck;
}

/// Everything the agent needs to start a run (spec §6 "Inputs").
pub struct AgentInvocation {
    pub system_prompt: String,
    pub initial_message: String,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub reports: std::sync::Arc<dyn ReportSink>,
    pub cancel: tokio_util_lite::CancelToken,
}

/// A minimal cancellation token so `halo-adapters` doesn't have to pull
/// in `tokio-util` just for this one shape (kept crate-local; the daemon
/// composition root may prefer `tokio_util::sync::CancellationToken`
/// directly where it already depends on that crate).
pub mod tokio_util_lite {
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Clone, Default)]
    pub struct CancelToken(Arc<Notify>);

    impl CancelToken {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn cancel(&self) {
            self.0.notify_waiters();
        }

        pub async fn cancelled(&self) {
            self.0.notified().await;
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentAdapterError {
    #[error("agent invocation failed: {0}")]
    InvocationFailed(String),
    #[error("agent invocation was cancelled")]
    Cancelled,
}

/// Run engine -> external agent boundary (spec §6).
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    async fn invoke(&self, ctx: AgentInvocation) -> Result<(), AgentAdapterError>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Scripted behavior for [`FakeAgentAdapter`].
    pub enum ScriptedOutcome {
        Reports(Vec<ReportCall>),
        Fail(String),
        Cancelled,
    }

    struct FakeState {
        invocations: Vec<String>,
        script: Option<ScriptedOutcome>,
    }

    /// Test double that replays a scripted sequence of `on_report` calls
    /// instead of invoking a real agent.
    #[derive(Clone)]
    pub struct FakeAgentAdapter {
        inner: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeAgentAdapter {
        fn default() -> Self {
            Self { inner: Arc::new(Mutex::new(FakeState { invocations: Vec::new(), script: None })) }
        }
    }

    impl FakeAgentAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(&self, outcome: ScriptedOutcome) {
            self.inner.lock().script = Some(outcome);
        }

        pub fn invocation_count(&self) -> usize {
            self.inner.lock().invocations.len()
        }
    }

    #[async_trait]
    impl AgentAdapter for FakeAgentAdapter {
        async fn invoke(&self, ctx: AgentInvocation) -> Result<(), AgentAdapterError> {
            self.inner.lock().invocations.push(ctx.initial_message.clone());
            let script = self.inner.lock().script.take();
            match script {
                Some(ScriptedOutcome::Reports(reports)) => {
                    for report in reports {
                        ctx.reports.on_report(report).await;
                    }
                    Ok(())
                }
                Some(ScriptedOutcome::Fail(reason)) => Err(AgentAdapterError::InvocationFailed(reason)),
                Some(ScriptedOutcome::Cancelled) => Err(AgentAdapterError::Cancelled),
                None => Ok(()),
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgentAdapter, ScriptedOutcome};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct NoopSink;

    #[async_trait]
    impl ReportSink for NoopSink {
        async fn on_report(&self, call: ReportCall) -> ReportAck {
            ReportAck { entry_id: "act-test".into(), must_end_run: call.kind == ReportKind::Escalation }
        }
    }

    #[tokio::test]
    async fn fake_adapter_replays_scripted_reports() {
        let adapter = FakeAgentAdapter::new();
        adapter.script(ScriptedOutcome::Reports(vec![ReportCall {
            kind: ReportKind::RunComplete,
            summary: "done".into(),
            data: None,
            question: None,
            choices: None,
        }]));

        let ctx = AgentInvocation {
            system_prompt: "sys".into(),
            initial_message: "go".into(),
            working_dir: "/tmp".into(),
            env: HashMap::new(),
            reports: Arc::new(NoopSink),
            cancel: tokio_util_lite::CancelToken::new(),
        };
        adapter.invoke(ctx).await.unwrap();
        assert_eq!(adapter.invocation_count(), 1);
    }

    #[tokio::test]
    async fn fake_adapter_surfaces_scripted_failure() {
        let adapter = FakeAgentAdapter::new();
        adapter.script(ScriptedOutcome::Fail("boom".into()));
        let ctx = AgentInvocation {
            system_prompt: "sys".into(),
            initial_message: "go".into(),
            working_dir: "/tmp".into(),
            env: HashMap::new(),
            reports: Arc::new(NoopSink),
            cancel: tokio_util_lite::CancelToken::new(),
        };
        assert!(adapter.invoke(ctx).await.is_err());
    }
}
