//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! owns the relay store; handlers never reach for globals.

use crate::store::RelayStore;

/// Clone is required by Axum; the store shares its slot across clones.
#[derive(Clone)]
pub struct AppState {
    pub store: RelayStore,
}

impl AppState {
    #[must_use]
    pub fn new(store: RelayStore) -> Self {
        Self { store }
    }
}
