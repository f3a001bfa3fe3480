// Application layer - Polling use cases over the sample source port
pub mod panel_service;
pub mod polling_engine;
pub mod sample_source;
pub mod telemetry_sync;
