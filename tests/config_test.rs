//! Configuration layering: defaults, explicit file, environment.

use std::io::Write;

use fixloop::domain::models::{LauncherKind, OracleBackend};
use fixloop::ConfigLoader;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_values_override_defaults() {
    let file = config_file(
        r"
workers:
  count: 5
  launcher: in_process
oracles:
  test:
    kind: http
    url: http://localhost:9000/test
",
    );

    temp_env::with_vars_unset(["FIXLOOP_WORKERS__COUNT"], || {
        let config = ConfigLoader::load_with(Some(file.path())).unwrap();
        assert_eq!(config.workers.count, 5);
        assert_eq!(config.workers.launcher, LauncherKind::InProcess);
        assert_eq!(config.oracles.test.kind, OracleBackend::Http);
        assert_eq!(config.loop_config.max_iterations, 10);
    });
}

#[test]
fn test_environment_overrides_file() {
    let file = config_file("workers:\n  count: 5\n");

    temp_env::with_vars(
        [
            ("FIXLOOP_WORKERS__COUNT", Some("8")),
            ("FIXLOOP_LOOP__MAX_ITERATIONS", Some("2")),
        ],
        || {
            let config = ConfigLoader::load_with(Some(file.path())).unwrap();
            assert_eq!(config.workers.count, 8);
            assert_eq!(config.loop_config.max_iterations, 2);
        },
    );
}

#[test]
fn test_invalid_environment_value_fails_validation() {
    let file = config_file("{}\n");

    temp_env::with_var("FIXLOOP_CIRCUIT_BREAKER__THRESHOLD", Some("1"), || {
        assert!(ConfigLoader::load_with(Some(file.path())).is_err());
    });
}
