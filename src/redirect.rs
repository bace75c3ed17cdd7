use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::generator::is_well_formed;
use crate::store::RecordStore;

/// Resolves short codes to their destinations.
///
/// Malformed codes are rejected before any store round-trip, and store
/// failures are reported as `NotFound` so callers see one failure shape.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn RecordStore>,
}

impl Resolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, code: &str) -> Result<String> {
        if !is_well_formed(code) {
            debug!("Rejected malformed code {:?}", code);
            return Err(Error::NotFound);
        }

        match self.store.get(code).await {
            Ok(Some(entry)) => Ok(entry.destination_url),
            Ok(None) => Err(Error::NotFound),
            Err(e) => {
                warn!("Lookup of {} failed: {}", code, e);
                Err(Error::NotFound)
            }
        }
    }
}
