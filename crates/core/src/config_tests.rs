// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_document_yields_defaults() {
    let config: Config = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config.region, "Development");
    assert_eq!(config.services_path, PathBuf::from("app/services"));
    assert_eq!(config.server_port, 2000);
    assert_eq!(config.local_ip, None);
    assert_eq!(config.registry.backend, RegistryBackend::Zk);
    assert_eq!(config.registry.servers, vec!["127.0.0.1:2181".to_string()]);
    assert_eq!(config.registry.connect_timeout, 10);
    assert_eq!(config.registry.pool.size, 5);
    assert_eq!(config.registry.pool.borrow_timeout, 30);
    assert_eq!(config.registry.pool.warn, 5);
    assert_eq!(config.registry.pool.idle, 600);
}

#[test]
fn full_document_parses() {
    let yaml = r#"
region: Production
services_path: services
server_port: 3000
local_ip: 192.168.11.3
registry:
  backend: doozer
  servers: ["10.0.0.1:8046", "10.0.0.2:8046"]
  connect_timeout: 2
  pool:
    size: 8
    borrow_timeout: 10
    warn: 1
    idle: 60
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.region, "Production");
    assert_eq!(config.server_port, 3000);
    assert_eq!(config.local_ip, Some("192.168.11.3".parse().unwrap()));
    assert_eq!(config.registry.backend, RegistryBackend::Doozer);
    assert_eq!(config.registry.servers.len(), 2);
    assert_eq!(config.registry.pool.size, 8);
    assert_eq!(config.registry.pool.idle_timeout(), Duration::from_secs(60));
}

#[test]
fn unknown_options_are_kept_not_rejected() {
    let yaml = "region: Test\nfrobnicate: true\nextra: { nested: 1 }\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.region, "Test");
    assert_eq!(config.unknown.len(), 2);
    assert!(config.unknown.contains_key("frobnicate"));
    // Logging the unknown keys must not panic.
    config.log_unknown_options();
}

#[test]
fn configured_local_ip_wins_over_probe() {
    let config =
        Config { local_ip: Some("192.168.11.0".parse().unwrap()), ..Config::default() };
    assert_eq!(config.local_ip(), "192.168.11.0".parse::<Ipv4Addr>().unwrap());
}
