//! Metrics recorder installation tests.

use ironwatch_core::config::MetricsConfig;
use ironwatch_operator::metrics_server;
use serial_test::serial;

fn config(listen_addr: &str, port: u16, endpoint: &str) -> MetricsConfig {
    MetricsConfig {
        enabled: true,
        listen_addr: listen_addr.to_owned(),
        port,
        endpoint: endpoint.to_owned(),
    }
}

#[test]
#[serial]
fn rejects_unsupported_endpoint() {
    let err = metrics_server::install_metrics_recorder(&config("127.0.0.1", 19101, "/prom"))
        .expect_err("custom endpoint should be rejected");
    assert!(err.to_string().contains("unsupported metrics endpoint"));
}

#[test]
#[serial]
fn rejects_invalid_listen_address() {
    let err = metrics_server::install_metrics_recorder(&config("999.999.999.999", 19102, "/metrics"))
        .expect_err("invalid address should be rejected");
    assert!(err.to_string().contains("invalid metrics listen address"));
}
