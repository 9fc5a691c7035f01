use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{SignalUpstream, UpstreamError, UpstreamReply};
use crate::signal::AnalysisRequest;

/// Scripted upstream for handler tests.
pub struct MockUpstream {
    outcome: Box<dyn Fn() -> Result<UpstreamReply, UpstreamError> + Send + Sync>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_request: Mutex<Option<AnalysisRequest>>,
}

impl MockUpstream {
    pub fn replying(reply: UpstreamReply) -> Self {
        Self::with(move || Ok(reply.clone()))
    }

    pub fn model_text(text: &str) -> Self {
        Self::replying(UpstreamReply::ModelText(text.to_string()))
    }

    pub fn proxy_body(text: &str) -> Self {
        Self::replying(UpstreamReply::ProxyBody(text.to_string()))
    }

    pub fn failing(make_error: impl Fn() -> UpstreamError + Send + Sync + 'static) -> Self {
        Self::with(move || Err(make_error()))
    }

    fn with(outcome: impl Fn() -> Result<UpstreamReply, UpstreamError> + Send + Sync + 'static) -> Self {
        Self {
            outcome: Box::new(outcome),
            delay: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Sleep before answering, to exercise the handler's deadline.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AnalysisRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl SignalUpstream for MockUpstream {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<UpstreamReply, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.outcome)()
    }
}
