pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::search::SearchService;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SearchService>,
    pub session_cookie: String,
}

impl AppState {
    pub fn new(service: Arc<SearchService>) -> Self {
        let session_cookie = service.compiler().config().session_cookie.clone();
        Self {
            service,
            session_cookie,
        }
    }
}
