// Application state for HTTP handlers
use crate::application::panel_service::PanelRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub panels: Arc<PanelRegistry>,
}
