// HTTP request handlers
use crate::application::panel_service::Panel;
use crate::infrastructure::chunked_stream::stream_response;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use crate::presentation::view::{PanelView, chart_views, panel_view};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{Stream, StreamExt, future};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub signal: Option<String>,
    pub max_points: Option<usize>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List every configured panel with its connection status
pub async fn list_panels(headers: HeaderMap, State(state): State<AppState>) -> Response {
    respond(&state.panels.list(), accepts_brotli(&headers)).await
}

/// Current view of one panel: status, latest sample and gauges
pub async fn get_panel(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let Some(panel) = state.panels.get(&id) else {
        return unknown_panel(&id);
    };

    let view = panel_view(&panel.config, &panel.sync.snapshot());
    respond(&view, accepts_brotli(&headers)).await
}

/// Chart series built from the panel's history buffer
pub async fn panel_history(
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let Some(panel) = state.panels.get(&id) else {
        return unknown_panel(&id);
    };

    let snapshot = panel.sync.snapshot();
    let charts = chart_views(
        &panel.config,
        &snapshot.history,
        query.signal.as_deref(),
        query.max_points,
    );
    if let Some(signal) = query.signal.as_deref().filter(|_| charts.is_empty()) {
        return (StatusCode::NOT_FOUND, format!("Unknown signal {signal} on panel {id}")).into_response();
    }

    respond(&charts, accepts_brotli(&headers)).await
}

/// Push a panel view every time the panel's state changes. Ends once the
/// panel is stopped.
pub async fn stream_panel(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let Some(panel) = state.panels.get(&id) else {
        return unknown_panel(&id);
    };

    tracing::debug!(panel = %id, "Opening panel stream");
    stream_response(panel_updates(panel), accepts_brotli(&headers))
}

fn panel_updates(panel: Arc<Panel>) -> impl Stream<Item = PanelView> {
    let updates = WatchStream::new(panel.sync.subscribe());
    let watched = panel.clone();

    updates
        .take_while(move |_| future::ready(!watched.sync.is_stopped()))
        .map(move |snapshot| panel_view(&panel.config, &snapshot))
}

async fn respond<T: Serialize>(data: &T, compress: bool) -> Response {
    match json_response(data, compress).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

fn unknown_panel(id: &str) -> Response {
    tracing::debug!(panel = %id, "Request for unknown panel");
    (StatusCode::NOT_FOUND, format!("Unknown panel {id}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::panel_service::PanelRegistry;
    use crate::application::polling_engine::tests::{ScriptedSource, record};
    use crate::application::sample_source::RealtimeBatch;
    use crate::infrastructure::config::parse_config;

    const CONFIG: &str = r#"
        [[panels]]
        id = "feed-drive"
        title = "Feed Drive"
        endpoint = "http://127.0.0.1:9/OPCUAFeedDrive.php"
        signals = ["speed", "position"]

        [[panels.gauges]]
        signal = "speed"
        title = "Speed"
        unit = "RPM"
        min = 0.0
        max = 1000.0
    "#;

    async fn state_with_data() -> AppState {
        let config = parse_config(CONFIG).unwrap();
        let source = Arc::new(ScriptedSource::default());
        source.push_realtime(Ok(RealtimeBatch::NewData(vec![
            record(3, 3.0, 0.3),
            record(2, 2.0, 0.2),
            record(1, 1.0, 0.1),
        ])));

        let panel = Panel::new(config.panels[0].clone(), source);
        panel.sync.poll_now().await;

        AppState {
            panels: Arc::new(PanelRegistry::new(vec![panel])),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_panels() {
        let state = state_with_data().await;

        let response = list_panels(HeaderMap::new(), State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body[0]["id"], "feed-drive");
        assert_eq!(body[0]["status"], "connected");
    }

    #[tokio::test]
    async fn test_get_panel_and_unknown_panel() {
        let state = state_with_data().await;

        let response = get_panel(Path("feed-drive".to_string()), HeaderMap::new(), State(state.clone())).await;
        let body = body_json(response).await;
        assert_eq!(body["cursor"], 3);
        assert_eq!(body["latest"]["id"], 3);
        assert_eq!(body["gauges"][0]["value"], 300.0);
        assert_eq!(body["gauges"][0]["percent"], 30.0);

        let response = get_panel(Path("spindle".to_string()), HeaderMap::new(), State(state)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_panel_history_filters_signal() {
        let state = state_with_data().await;
        let query = HistoryQuery {
            signal: Some("position".to_string()),
            max_points: None,
        };

        let response = panel_history(
            Path("feed-drive".to_string()),
            Query(query),
            HeaderMap::new(),
            State(state.clone()),
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["signal"], "position");
        assert_eq!(body[0]["points"].as_array().unwrap().len(), 3);

        let query = HistoryQuery {
            signal: Some("torque".to_string()),
            max_points: None,
        };
        let response = panel_history(
            Path("feed-drive".to_string()),
            Query(query),
            HeaderMap::new(),
            State(state),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stream_ends_when_panel_stops() {
        let state = state_with_data().await;
        let panel = state.panels.get("feed-drive").unwrap();
        let mut updates = Box::pin(panel_updates(panel.clone()));

        let first = updates.next().await.unwrap();
        assert_eq!(first.cursor, 3);

        panel.sync.stop();
        assert!(updates.next().await.is_none());
    }
}
