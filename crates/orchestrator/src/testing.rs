//! Scripted agent backend for driver tests.

use conductor_agent::{AgentInvoker, AgentOutput, AgentRequest};
use conductor_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How the backend answers a role.
pub enum Script {
    Reply(String),
    Fail(String),
    Delay(Duration, String),
}

/// Answers by role; unscripted roles reply "<role> done".
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: HashMap<String, Script>,
    requests: Mutex<Vec<AgentRequest>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, role: &str, script: Script) -> Self {
        self.scripts.insert(role.to_string(), script);
        self
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_for(&self, role: &str) -> Option<AgentRequest> {
        self.requests().into_iter().find(|r| r.role == role)
    }

    /// Highest number of requests in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AgentInvoker for ScriptedInvoker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: &AgentRequest) -> AppResult<AgentOutput> {
        self.requests.lock().unwrap().push(request.clone());
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        let result = match self.scripts.get(&request.role) {
            Some(Script::Reply(text)) => Ok(AgentOutput::text(text.clone())),
            Some(Script::Fail(message)) => Err(AppError::AgentInvocation {
                role: request.role.clone(),
                message: message.clone(),
            }),
            Some(Script::Delay(delay, text)) => {
                tokio::time::sleep(*delay).await;
                Ok(AgentOutput::text(text.clone()))
            }
            None => Ok(AgentOutput::text(format!("{} done", request.role))),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
