use molecule_factory_lib::config::CONFIG_FILE_ENV;
use molecule_factory_lib::{FactoryConfig, FactoryError};
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

const ENV_VARS: &[&str] = &[
    CONFIG_FILE_ENV,
    "FACTORY_CHANNEL_CAPACITY",
    "FACTORY_A_PERIOD_MS",
    "FACTORY_B_PERIOD_MS",
    "FACTORY_ASSEMBLY_MS",
    "FACTORY_TARGET_RATE",
    "FACTORY_WORKERS",
    "FACTORY_TICK_PERIOD_MS",
    "FACTORY_POOL_QUEUE_CAPACITY",
    "FACTORY_SHUTDOWN_GRACE_MS",
];

fn clear_env() {
    for name in ENV_VARS {
        std::env::remove_var(name);
    }
}

/// Test configuration loading and layering
#[cfg(test)]
mod factory_config_tests {
    use super::*;

    #[test]
    #[serial]
    fn test_load_without_overrides_gives_defaults() {
        clear_env();
        let config = FactoryConfig::load().unwrap();
        assert_eq!(config, FactoryConfig::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides_each_option() {
        clear_env();
        std::env::set_var("FACTORY_CHANNEL_CAPACITY", "64");
        std::env::set_var("FACTORY_A_PERIOD_MS", "20");
        std::env::set_var("FACTORY_TARGET_RATE", "4");
        std::env::set_var("FACTORY_ASSEMBLY_MS", "2500");

        let config = FactoryConfig::load().unwrap();
        clear_env();

        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.a_period(), Duration::from_millis(20));
        assert_eq!(config.b_period(), Duration::from_millis(150));
        assert_eq!(config.worker_count(), 10);
        assert_eq!(config.tick_period(), Duration::from_millis(250));
    }

    #[test]
    #[serial]
    fn test_unparseable_env_value_is_reported() {
        clear_env();
        std::env::set_var("FACTORY_WORKERS", "lots");

        let result = FactoryConfig::load();
        clear_env();

        match result {
            Err(FactoryError::ConfigSource(message)) => {
                assert!(message.contains("FACTORY_WORKERS"), "{}", message)
            }
            other => panic!("expected ConfigSource error, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_json_file_then_env_layering() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "channel_capacity": 32, "assembly_ms": 1000, "workers": 3 }}"#
        )
        .unwrap();

        std::env::set_var(CONFIG_FILE_ENV, file.path());
        std::env::set_var("FACTORY_WORKERS", "5");
        let config = FactoryConfig::load().unwrap();
        clear_env();

        assert_eq!(config.channel_capacity, 32);
        assert_eq!(config.assembly_duration(), Duration::from_secs(1));
        // Env beats the file
        assert_eq!(config.worker_count(), 5);
        // Unspecified fields keep their defaults
        assert_eq!(config.b_period_ms, 150);
    }

    #[test]
    fn test_missing_file_is_config_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FactoryConfig::from_json_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(FactoryError::ConfigSource(_))));
    }

    #[test]
    fn test_malformed_file_is_config_source_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let result = FactoryConfig::from_json_file(file.path());
        assert!(matches!(result, Err(FactoryError::ConfigSource(_))));
    }

    #[test]
    #[serial]
    fn test_loaded_zero_rate_fails_validation() {
        clear_env();
        std::env::set_var("FACTORY_TARGET_RATE", "0");
        let config = FactoryConfig::load().unwrap();
        clear_env();

        assert!(matches!(
            config.validate(),
            Err(FactoryError::InvalidConfig(_))
        ));
    }
}
