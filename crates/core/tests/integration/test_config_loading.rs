//! Loading validator configuration and rule tables from files

use std::io::Write;

use nmos_conformance::config::LegParityReference;
use nmos_conformance::resource::TransportKind;
use nmos_conformance::{Error, Role, RuleTable, ValidatorConfig};
use tempfile::{Builder, NamedTempFile};

fn write_file(suffix: &str, content: &str) -> anyhow::Result<NamedTempFile> {
    let mut file = Builder::new().suffix(suffix).tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn test_config_from_toml_file() -> anyhow::Result<()> {
    // GIVEN: A TOML file overriding a few settings
    let file = write_file(
        ".toml",
        r#"
        extension_prefix = "acme_"
        sender_leg_reference = "per_state"
        leg_specific_parameters = ["destination_ip"]

        [http]
        base_url = "http://192.0.2.10:8080"
        timeout_secs = 5
        "#,
    )?;

    // WHEN
    let config = ValidatorConfig::from_file(file.path())?;

    // THEN: Overrides apply and everything else keeps its default
    assert_eq!(config.extension_prefix, "acme_");
    assert_eq!(config.leg_reference(Role::Sender), LegParityReference::PerState);
    assert_eq!(config.leg_reference(Role::Receiver), LegParityReference::Constraints);
    assert_eq!(config.leg_specific_parameters, vec!["destination_ip".to_string()]);
    assert_eq!(config.http.timeout_secs, 5);
    assert_eq!(config.http.api_version, "v1.1");
    assert_eq!(config.disabled_sentinel, "NULL");
    Ok(())
}

#[test]
fn test_config_from_json_file() -> anyhow::Result<()> {
    let file = write_file(
        ".json",
        r#"{"allow_auto_in_staged": false, "invalid_value_marker": "bogus"}"#,
    )?;

    let config = ValidatorConfig::from_file(file.path())?;
    assert!(!config.allow_auto_in_staged);
    assert_eq!(config.invalid_value_marker, "bogus");
    assert_eq!(config.extension_prefix, "x_");
    Ok(())
}

#[test]
fn test_config_errors() -> anyhow::Result<()> {
    let missing = ValidatorConfig::from_file("/nonexistent/validator.toml").unwrap_err();
    assert!(matches!(missing, Error::Io(_)));

    let file = write_file(".json", "{\"extension_prefix\": 7}")?;
    let invalid = ValidatorConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(invalid, Error::ConfigError(_)));
    Ok(())
}

#[test]
fn test_rule_table_from_file() -> anyhow::Result<()> {
    // GIVEN: A vendor bundle in a JSON rule table
    let file = write_file(
        ".json",
        r#"{
            "sentinel": "OFF",
            "discriminators": [{
                "name": "acme",
                "trigger_prefix": "x_acme_",
                "mandatory": ["x_acme_gain", "x_acme_mute"],
                "transports": ["rtp"],
                "roles": ["receiver"]
            }]
        }"#,
    )?;

    // WHEN
    let table = RuleTable::from_file(file.path())?;

    // THEN: The bundle is mandatory once triggered, for its role only
    assert_eq!(table.sentinel, "OFF");
    let triggered = table.required_parameters(&TransportKind::Rtp, Role::Receiver, &["x_acme_gain"]);
    assert!(triggered.mandatory.contains("x_acme_mute"));
    let other_role = table.required_parameters(&TransportKind::Rtp, Role::Sender, &["x_acme_gain"]);
    assert!(!other_role.mandatory.contains("x_acme_mute"));

    // Sections the file leaves out keep the built-in rules
    assert!(!table.key_material.is_empty());
    Ok(())
}
