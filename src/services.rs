use std::sync::Arc;

use crate::store::EntityStore;
use crate::upstream::UpstreamClient;

/// Collaborators shared by every workflow step, built once at startup.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn EntityStore>,
    pub upstream: UpstreamClient,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("upstream", &self.upstream)
            .finish_non_exhaustive()
    }
}

impl Services {
    pub fn new(store: Arc<dyn EntityStore>, upstream: UpstreamClient) -> Self {
        Self { store, upstream }
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }
}
