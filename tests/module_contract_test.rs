//! Integration tests for the module lifecycle contract.

use r0n_rate_proxy::module::{
    Capability, ModuleConfig, ModuleContract, ModuleError, ModuleManifest, ModuleStatus,
};
use r0n_rate_proxy::modules::proxy::ProxyModule;
use r0n_rate_proxy::modules::rate_limiting::{HostLimit, RateLimitConfig, RateLimitHandler};

fn rate_table() -> ModuleConfig {
    let config = RateLimitConfig::new()
        .with_host(HostLimit::new("graph.facebook.com", 60.0))
        .with_host(HostLimit::new("api.twitter.com", 50.0))
        .with_host(HostLimit::new("bsapi.vmaibo.com", 20.0));
    ModuleConfig::from_section(&config).unwrap()
}

fn listener_on_ephemeral_port() -> ModuleConfig {
    ModuleConfig::from_raw(
        r#"
        [server]
        address = "127.0.0.1"
        port = 0
        "#,
    )
}

fn drive(module: &mut dyn ModuleContract, config: ModuleConfig) {
    assert_eq!(module.status(), ModuleStatus::Stopped);
    assert!(!module.heartbeat());

    module.init(config).unwrap();
    assert_eq!(module.status(), ModuleStatus::Initializing);

    module.start().unwrap();
    assert!(module.status().is_healthy());
    assert!(module.heartbeat());

    module.stop().unwrap();
    assert!(module.status().is_stopped());
}

#[tokio::test]
async fn test_module_lifecycle() {
    let mut rate_limiter = RateLimitHandler::new();
    drive(&mut rate_limiter, rate_table());

    let limiter = rate_limiter.limiter().unwrap();
    assert_eq!(limiter.limited_host_count(), 3);

    let mut proxy = ProxyModule::new(limiter);
    drive(&mut proxy, listener_on_ephemeral_port());
}

#[tokio::test]
async fn test_modules_as_trait_objects() {
    let mut rate_limiter = RateLimitHandler::new();
    rate_limiter.init(rate_table()).unwrap();
    let limiter = rate_limiter.limiter().unwrap();

    let mut modules: Vec<Box<dyn ModuleContract>> = vec![
        Box::new(rate_limiter),
        Box::new(ProxyModule::new(limiter)),
    ];
    modules[1].init(listener_on_ephemeral_port()).unwrap();

    for module in &mut modules {
        module.start().unwrap();
    }
    let names: Vec<String> = modules.iter().map(|m| m.manifest().name).collect();
    assert_eq!(names, ["rate-limiter", "rate-proxy"]);
    assert!(modules.iter().all(|m| m.heartbeat()));

    for module in modules.iter_mut().rev() {
        module.stop().unwrap();
    }
}

#[tokio::test]
async fn test_module_invalid_state_transition() {
    let mut rate_limiter = RateLimitHandler::new();

    let err = rate_limiter.start().unwrap_err();
    assert!(matches!(err, ModuleError::InvalidState { .. }));

    let err = rate_limiter.stop().unwrap_err();
    assert!(matches!(err, ModuleError::InvalidState { .. }));

    rate_limiter.init(rate_table()).unwrap();
    let err = rate_limiter.init(rate_table()).unwrap_err();
    assert!(matches!(err, ModuleError::InvalidState { .. }));
}

#[test]
fn test_module_manifest_builder() {
    let manifest = ModuleManifest::builder("custom")
        .description("A module built in a test")
        .version(2, 1, 0)
        .capability(Capability::RateLimiting)
        .capability(Capability::Custom("audit".to_string()))
        .build();

    assert_eq!(manifest.name, "custom");
    assert_eq!(manifest.version.to_string(), "2.1.0");
    assert!(manifest.has_capability(&Capability::RateLimiting));
    assert!(manifest.has_capability(&Capability::Custom("audit".to_string())));
    assert!(!manifest.has_capability(&Capability::TlsTermination));
}

#[test]
fn test_module_status_checks() {
    assert!(ModuleStatus::Running.is_healthy());
    assert!(ModuleStatus::Running.is_operational());

    let degraded = ModuleStatus::Degraded {
        reason: "upstream slow".to_string(),
    };
    assert!(!degraded.is_healthy());
    assert!(degraded.is_operational());
    assert_eq!(degraded.to_string(), "degraded: upstream slow");

    assert!(ModuleStatus::Stopped.is_stopped());
    assert!(!ModuleStatus::Initializing.is_operational());
}

#[test]
fn test_metrics_prometheus_dump() {
    let mut rate_limiter = RateLimitHandler::new();
    rate_limiter.init(rate_table()).unwrap();

    let limiter = rate_limiter.limiter().unwrap();
    assert!(limiter.allow("api.twitter.com"));
    assert!(limiter.allow("unlisted.example"));

    let text = rate_limiter.metrics().to_prometheus("r0n_rate_proxy");
    assert!(text.contains("r0n_rate_proxy_checks_total 1\n"), "{text}");
    assert!(text.contains("r0n_rate_proxy_allowed_total 1\n"), "{text}");
    assert!(text.contains("r0n_rate_proxy_limited_hosts 3\n"), "{text}");
}
