//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Fails if a
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants.

/// Commands received (counter, labels: method).
pub const COMMANDS_TOTAL: &str = "huddle_commands_total";
/// `method` label for frames naming a method the server does not know.
pub const UNKNOWN_METHOD: &str = "unknown";
/// Commands rejected (counter, labels: code).
pub const COMMAND_REJECTIONS_TOTAL: &str = "huddle_command_rejections_total";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "huddle_ws_connections_total";
/// WebSocket disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "huddle_ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "huddle_ws_connections_active";
/// Frames dropped on a full or closed send queue (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "huddle_ws_broadcast_drops_total";
