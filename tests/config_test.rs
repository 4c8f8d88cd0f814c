//! Config loading and defaults integration tests

use waymark::Config;

#[test]
fn test_empty_config_uses_defaults() {
    let config: Config = toml::from_str("").expect("valid TOML");
    config.validate().expect("defaults are valid");

    assert_eq!(config.server.http_port, 8084);
    assert_eq!(config.policy.max_accuracy_m, 150.0);
    assert_eq!(config.policy.rarity_xp.common, 25);
    assert_eq!(config.policy.rarity_xp.legendary, 200);
    assert_eq!(config.policy.tier_thresholds.bronze_pct, 33.0);
    assert_eq!(config.policy.tier_thresholds.gold_pct, 100.0);
    assert_eq!(config.policy.ep_per_completion, 10);
}

#[test]
fn test_config_with_all_fields() {
    let toml_str = r#"
[server]
http_port = 9000

[database]
data_dir = "/var/lib/waymark"

[policy]
max_accuracy_m = 80.0
level_base_xp = 250
ep_per_completion = 5

[policy.rarity_xp]
common = 10
rare = 20
epic = 40
legendary = 80

[policy.tier_thresholds]
bronze_pct = 25.0
silver_pct = 50.0
gold_pct = 100.0
"#;

    let config: Config = toml::from_str(toml_str).expect("valid TOML");
    config.validate().expect("config is valid");

    assert_eq!(config.server.http_port, 9000);
    assert_eq!(
        config.database.data_dir,
        std::path::PathBuf::from("/var/lib/waymark")
    );
    assert_eq!(config.policy.max_accuracy_m, 80.0);
    assert_eq!(config.policy.rarity_xp.epic, 40);
    assert_eq!(config.policy.tier_thresholds.silver_pct, 50.0);
    assert_eq!(config.policy.level_base_xp, 250);
}

#[test]
fn test_partial_policy_section_fills_defaults() {
    let toml_str = r#"
[policy]
max_accuracy_m = 100.0
"#;

    let config: Config = toml::from_str(toml_str).expect("valid TOML");
    assert_eq!(config.policy.max_accuracy_m, 100.0);
    // Untouched fields keep their defaults
    assert_eq!(config.policy.rarity_xp.rare, 50);
    assert_eq!(config.policy.level_base_xp, 100);
}

#[test]
fn test_load_round_trip_through_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("waymark.toml");

    let mut config = Config::default();
    config.server.http_port = 9999;
    config.policy.rarity_xp.legendary = 500;
    config.save(&path).expect("save");

    let loaded = Config::load(&path).expect("load");
    assert_eq!(loaded.server.http_port, 9999);
    assert_eq!(loaded.policy.rarity_xp.legendary, 500);
}

#[test]
fn test_load_rejects_non_monotonic_tiers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("waymark.toml");

    let toml_str = r#"
[policy.tier_thresholds]
bronze_pct = 70.0
silver_pct = 50.0
gold_pct = 100.0
"#;
    std::fs::write(&path, toml_str).expect("write");

    assert!(Config::load(&path).is_err());
}
