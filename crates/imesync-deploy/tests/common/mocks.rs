//! Mock input engine for orchestrator tests

#![allow(dead_code)]

use async_trait::async_trait;
use imesync_core::{Error, Result};
use imesync_deploy::{EnginePaths, InputEngine};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Called on every engine call; its result is stored with the call
pub type Probe = Arc<dyn Fn() -> String + Send + Sync>;

/// Record of an engine call
#[derive(Clone, Debug)]
pub struct EngineCall {
    pub operation: String,
    pub paths: EnginePaths,
    /// Probe output at the time of the call
    pub observed: Option<String>,
}

#[derive(Default)]
pub struct MockEngine {
    calls: Mutex<Vec<EngineCall>>,
    fail_on: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    probe: Mutex<Option<Probe>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `operation` ("deploy", "sync" or "reset") fail
    pub fn fail_on(&self, operation: &str) {
        *self.fail_on.lock().unwrap() = Some(operation.to_string());
    }

    /// Make every call sleep first
    pub fn stall_for(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_probe(&self, probe: Probe) {
        *self.probe.lock().unwrap() = Some(probe);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.operation).collect()
    }

    async fn call(&self, operation: &str, paths: &EnginePaths) -> Result<()> {
        let observed = self.probe.lock().unwrap().clone().map(|probe| probe());
        self.calls.lock().unwrap().push(EngineCall {
            operation: operation.to_string(),
            paths: paths.clone(),
            observed,
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_on.lock().unwrap().as_deref() == Some(operation) {
            return Err(Error::engine(operation, "mock engine failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl InputEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn redeploy(&self, paths: &EnginePaths) -> Result<()> {
        self.call("deploy", paths).await
    }

    async fn sync(&self, paths: &EnginePaths) -> Result<()> {
        self.call("sync", paths).await
    }

    async fn reset(&self, paths: &EnginePaths) -> Result<()> {
        self.call("reset", paths).await
    }
}
