use atrium_domain::config::{BusKind, Config};

#[test]
fn default_bind_addr_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.bind_addr, "127.0.0.1:8087");
}

#[test]
fn env_overrides_are_honored() {
    // One test owns all the env mutation so parallel tests never race.
    std::env::set_var("BIND_ADDR", "0.0.0.0:3210");
    std::env::set_var("BUS_TYPE", "kafka");
    std::env::set_var("GOAL_TTL_SECONDS", "120");
    std::env::set_var("TELEMETRY_ENABLED", "true");
    std::env::set_var("TURN_TOOL_CALL_BUDGET", "not-a-number");

    let config = Config::from_env();
    assert_eq!(config.server.bind_addr, "0.0.0.0:3210");
    assert_eq!(config.bus.kind, BusKind::Kafka);
    assert_eq!(config.goals.ttl_seconds, 120);
    assert!(config.telemetry.enabled);
    // Unparseable values fall back to the default.
    assert_eq!(config.turn.tool_call_budget, 8);

    for key in [
        "BIND_ADDR",
        "BUS_TYPE",
        "GOAL_TTL_SECONDS",
        "TELEMETRY_ENABLED",
        "TURN_TOOL_CALL_BUDGET",
    ] {
        std::env::remove_var(key);
    }
}
