//! Health aggregation tests.

use ironwatch_core::pipeline::HealthStatus;
use ironwatch_operator::health::{ModuleHealth, aggregate_status};

fn module(name: &str, enabled: bool, status: HealthStatus) -> ModuleHealth {
    ModuleHealth {
        name: name.to_owned(),
        enabled,
        status,
    }
}

#[test]
fn all_healthy_is_healthy() {
    let modules = vec![
        module("resource-watcher", true, HealthStatus::Healthy),
        module("scan-sink", true, HealthStatus::Healthy),
    ];
    assert!(aggregate_status(&modules).is_healthy());
}

#[test]
fn no_modules_is_healthy() {
    assert!(aggregate_status(&[]).is_healthy());
}

#[test]
fn degraded_reason_names_module() {
    let modules = vec![
        module("resource-watcher", true, HealthStatus::Degraded("disconnected streams: pods".to_owned())),
        module("scan-sink", true, HealthStatus::Healthy),
    ];

    match aggregate_status(&modules) {
        HealthStatus::Degraded(reason) => {
            assert!(reason.contains("resource-watcher"));
            assert!(reason.contains("disconnected streams: pods"));
        }
        other => panic!("expected Degraded, got: {other:?}"),
    }
}

#[test]
fn unhealthy_wins_over_degraded() {
    let modules = vec![
        module("a", true, HealthStatus::Degraded("slow".to_owned())),
        module("b", true, HealthStatus::Unhealthy("not started".to_owned())),
        module("c", true, HealthStatus::Degraded("slower".to_owned())),
    ];

    match aggregate_status(&modules) {
        HealthStatus::Unhealthy(reason) => {
            assert_eq!(reason, "b: not started");
        }
        other => panic!("expected Unhealthy, got: {other:?}"),
    }
}

#[test]
fn multiple_degraded_reasons_are_joined() {
    let modules = vec![
        module("a", true, HealthStatus::Degraded("x".to_owned())),
        module("b", true, HealthStatus::Degraded("y".to_owned())),
    ];
    assert_eq!(
        aggregate_status(&modules),
        HealthStatus::Degraded("a: x; b: y".to_owned())
    );
}

#[test]
fn disabled_modules_are_ignored() {
    let modules = vec![
        module("resource-watcher", false, HealthStatus::Unhealthy("stopped".to_owned())),
        module("scan-sink", true, HealthStatus::Healthy),
    ];
    assert!(aggregate_status(&modules).is_healthy());
}
