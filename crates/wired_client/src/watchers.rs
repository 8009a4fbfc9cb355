use std::fmt;
use std::sync::Arc;

use wired_common::WireResponse;

use crate::error::ClientError;

pub type ResponseWatcher = Arc<dyn Fn(&WireResponse) + Send + Sync>;
pub type ErrorWatcher = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Ordered response and error callbacks.
#[derive(Clone, Default)]
pub struct Watchers {
    responses: Vec<ResponseWatcher>,
    errors: Vec<ErrorWatcher>,
}

impl Watchers {
    pub fn on_response(&mut self, watcher: impl Fn(&WireResponse) + Send + Sync + 'static) {
        self.responses.push(Arc::new(watcher));
    }

    pub fn on_error(&mut self, watcher: impl Fn(&ClientError) + Send + Sync + 'static) {
        self.errors.push(Arc::new(watcher));
    }

    pub fn len(&self) -> usize {
        self.responses.len() + self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn notify_response(&self, response: &WireResponse) {
        for watcher in &self.responses {
            watcher(response);
        }
    }

    pub(crate) fn notify_error(&self, error: &ClientError) {
        for watcher in &self.errors {
            watcher(error);
        }
    }
}

impl fmt::Debug for Watchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchers")
            .field("responses", &self.responses.len())
            .field("errors", &self.errors.len())
            .finish()
    }
}
