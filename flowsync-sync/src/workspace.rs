//! Everything a pull or push run needs to know about where it operates.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use flowsync_core::CustomerIdn;

use crate::confirm::Confirmer;
use crate::remote::Platform;

/// A workspace root bound to one customer, its platform and its confirmer.
#[derive(Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub customer: CustomerIdn,
    pub platform: Arc<dyn Platform>,
    pub confirmer: Arc<dyn Confirmer>,
    /// Cancelling stops every pool of the run from issuing more work.
    pub cancel: CancellationToken,
}

impl Workspace {
    pub fn new(
        root: impl Into<PathBuf>,
        customer: CustomerIdn,
        platform: Arc<dyn Platform>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            root: root.into(),
            customer,
            platform,
            confirmer,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field("customer", &self.customer)
            .finish_non_exhaustive()
    }
}
