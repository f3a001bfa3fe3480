// Domain layer - Telemetry samples and the rules applied to them
pub mod connection;
pub mod history;
pub mod outlier;
pub mod sample;
