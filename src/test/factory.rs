use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::traits::Factory;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TestError(pub String);

/// Lets a test hold factory invocations at their start until it decides to let them go.
#[derive(Debug)]
pub struct Gate {
    started: Notify,
    release: Semaphore,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            started: Notify::new(),
            release: Semaphore::new(0),
        }
    }
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn enter(&self) {
        self.started.notify_one();
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
    }

    /// Resolves once an invocation reached the gate.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Let `count` invocations through.
    pub fn release(&self, count: usize) {
        self.release.add_permits(count);
    }
}

/// Uppercases the key, counting invocations and teardowns.
#[derive(Debug, Default)]
pub struct CountingFactory {
    created:   AtomicUsize,
    torn_down: Mutex<Vec<String>>,
    failures:  AtomicUsize,
    delay:     Option<Duration>,
    gate:      Option<Arc<Gate>>,
}

impl CountingFactory {
    /// Make every invocation sleep before producing its value.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The next `count` invocations fail.
    pub fn with_failures(self, count: usize) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of factory invocations so far, including failed and cancelled ones.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn torn_down(&self) -> usize {
        self.torn_down.lock().len()
    }

    /// Keys of the values torn down, in order.
    pub fn torn_down_keys(&self) -> Vec<String> {
        self.torn_down.lock().clone()
    }
}

#[async_trait]
impl Factory for CountingFactory {
    type Args = ();
    type Error = TestError;
    type Key = String;
    type Value = Arc<String>;

    async fn create(&self, key: &String, _args: (), _token: CancellationToken) -> Result<Arc<String>, TestError> {
        let attempt = self.created.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(gate) = &self.gate {
            gate.enter().await;
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TestError(format!("attempt {attempt} for '{key}' failed")));
        }

        Ok(Arc::new(key.to_uppercase()))
    }

    fn teardown(&self, key: &String, _value: Arc<String>) {
        self.torn_down.lock().push(key.clone());
    }
}
