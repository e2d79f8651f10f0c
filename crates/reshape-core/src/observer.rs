use std::time::Duration;

/// Summary of one finished engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub operation: &'static str,
    pub rules: usize,
    pub array_keys: usize,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Completion hook, called once per invocation whether it succeeded or not.
///
/// Observers run on the caller's thread and must not block.
pub trait ExecutionObserver: Send + Sync {
    fn on_complete(&self, record: &ExecutionRecord);
}

impl<F> ExecutionObserver for F
where
    F: Fn(&ExecutionRecord) + Send + Sync,
{
    fn on_complete(&self, record: &ExecutionRecord) {
        self(record)
    }
}

/// Emits each record as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_complete(&self, record: &ExecutionRecord) {
        let elapsed_us = record.elapsed.as_micros() as u64;
        match &record.error {
            None => tracing::info!(
                operation = record.operation,
                rules = record.rules,
                array_keys = record.array_keys,
                elapsed_us,
                "reshape completed"
            ),
            Some(error) => tracing::warn!(
                operation = record.operation,
                rules = record.rules,
                elapsed_us,
                error = %error,
                "reshape failed"
            ),
        }
    }
}
