//! Prometheus 스크레이프 엔드포인트
//!
//! `metrics-exporter-prometheus`의 내장 HTTP 리스너를 사용합니다.
//! 설치 후에는 watcher와 operator의 모든 `metrics::counter!()`, `gauge!()`,
//! `histogram!()` 호출이 `/metrics`로 노출됩니다.

use std::net::SocketAddr;

use anyhow::Result;
use ironwatch_core::config::MetricsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;

/// 내장 리스너가 제공하는 유일한 경로
pub const METRICS_ENDPOINT: &str = "/metrics";

/// 설정에서 리스너 주소를 계산합니다.
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != METRICS_ENDPOINT {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '{}' is currently supported",
            config.endpoint,
            METRICS_ENDPOINT
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// 전역 레코더와 HTTP 리스너를 설치하고 메트릭 설명을 등록합니다.
///
/// 프로세스당 한 번만 호출합니다. 이미 레코더가 설치되어 있거나
/// 주소를 바인딩할 수 없으면 에러를 반환합니다.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<SocketAddr> {
    let addr = listen_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    ironwatch_core::metrics::describe_all();
    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");

    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(listen_addr: &str, port: u16) -> MetricsConfig {
        MetricsConfig {
            enabled: true,
            listen_addr: listen_addr.to_owned(),
            port,
            endpoint: METRICS_ENDPOINT.to_owned(),
        }
    }

    #[test]
    fn listen_addr_combines_host_and_port() {
        let addr = listen_addr(&config("127.0.0.1", 9090)).unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:9090");
    }

    #[test]
    fn listen_addr_accepts_ipv6_literal() {
        let addr = listen_addr(&config("[::1]", 9100)).unwrap();
        assert!(addr.is_ipv6());
    }

    #[test]
    fn hostnames_are_not_resolved() {
        assert!(listen_addr(&config("localhost", 9090)).is_err());
    }
}
