use crate::services::fragment_service::FragmentService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub fragments: FragmentService,

    /// Public base URL used to build `Location` headers.
    pub api_url: String,
}

impl AppState {
    pub fn new(fragments: FragmentService, api_url: impl Into<String>) -> Self {
        Self {
            fragments,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn fragment_url(&self, id: &str) -> String {
        format!("{}/v1/fragments/{}", self.api_url, id)
    }
}
