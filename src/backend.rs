//! HTTP boundary of the application: router, handlers, session extractor,
//! flash messages and the mapping of errors to responses.

pub mod flash;
pub mod handlers_auth;
pub mod handlers_unauth;
mod middlewares;
pub mod responses;
pub mod router;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::services::Service;

/// Application state shared by every handler.
pub struct AppState {
    service: Mutex<Service>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(service: Service) -> SharedState {
        Arc::new(Self {
            service: Mutex::new(service),
        })
    }

    /// Locks the service. The guard must be dropped before the next `.await`.
    pub fn service(&self) -> MutexGuard<'_, Service> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
