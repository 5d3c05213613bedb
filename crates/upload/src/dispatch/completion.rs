use tracing::debug;

use crate::protocol::UploadError;

/// First-error-wins completion state for one request.
///
/// The dispatch loop records every failure here; only the first one
/// settles, later reports are no-ops. This is the idempotence guard that
/// keeps a request from surfacing more than one terminal error.
#[derive(Debug, Default)]
pub(crate) struct CompletionGuard {
    error: Option<UploadError>,
}

impl CompletionGuard {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a terminal failure; a second report is dropped.
    pub(crate) fn fail(&mut self, error: UploadError) {
        if self.error.is_some() {
            debug!(cause = %error, "request already failed, dropping later error");
            return;
        }
        self.error = Some(error);
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn into_error(self) -> Option<UploadError> {
        self.error
    }
}
