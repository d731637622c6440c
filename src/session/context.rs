use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::session::SessionError;

/// Cancellation and deadline scope for one call into the transport.
///
/// Clones share the same token, so cancelling any clone cancels every request
/// running under it. When a request is cancelled or times out its future is
/// dropped, which releases any open stream.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<SessionError>,
    {
        if self.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let guarded = async {
            tokio::select! {
                _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
                res = fut => res.map_err(Into::into),
            }
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| SessionError::Timeout(limit))?,
            None => guarded.await,
        }
    }
}
