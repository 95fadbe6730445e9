//! Prometheus metrics exposition
//!
//! - `web_requests_total` (counter): labels `route`, `status`
//! - `web_logins_total` (counter): label `outcome`
//! - `web_remote_errors_total` (counter): label `kind`
//! - `web_sessions_active` (gauge)

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Record a completed request against its matched route template.
pub fn record_request(route: &str, status: u16) {
    metrics::counter!(
        "web_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the end of a sign-in attempt (`success`, `denied`, `invalid_state`, `token_error`).
pub fn record_login(outcome: &'static str) {
    metrics::counter!("web_logins_total", "outcome" => outcome).increment(1);
}

pub fn record_remote_error(kind: &'static str) {
    metrics::counter!("web_remote_errors_total", "kind" => kind).increment(1);
}

pub fn set_sessions_active(count: usize) {
    metrics::gauge!("web_sessions_active").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("/api/files", 200);
        record_login("success");
        record_remote_error("remote_api_error");
        set_sessions_active(3);
    }

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn counters_carry_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("/api/files", 200);
        record_request("/api/files", 502);
        record_login("invalid_state");
        record_remote_error("remote_api_error");

        let output = handle.render();
        assert!(output.contains("web_requests_total"));
        assert!(output.contains("route=\"/api/files\""));
        assert!(output.contains("status=\"502\""));
        assert!(output.contains("outcome=\"invalid_state\""));
        assert!(output.contains("kind=\"remote_api_error\""));
    }

    #[test]
    fn sessions_gauge_tracks_latest_value() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        set_sessions_active(5);
        set_sessions_active(2);

        let output = handle.render();
        assert!(output.contains("web_sessions_active 2"), "got: {output}");
    }
}
