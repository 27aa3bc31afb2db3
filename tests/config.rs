use std::path::PathBuf;
use std::time::Duration;

use dockside::Settings;
use dockside::error::Error;

const FULL: &str = "
repository: https://github.com/acme/myapp.git
branch: release
ssh_user: deploy
server: 203.0.113.10
ssh_key: /home/ops/.ssh/id_ed25519
port: 8080
domain: example.com
token_env: ACME_TOKEN
provision: true
verify: true
workdir: /var/lib/dockside
settle_secs: 2
";

#[test]
fn parses_every_key() {
    let settings = Settings::from_yaml(FULL).unwrap();

    assert_eq!(settings.branch.as_deref(), Some("release"));
    assert_eq!(settings.port, Some(8080));
    assert_eq!(settings.token_env.as_deref(), Some("ACME_TOKEN"));

    let options = settings.run_options();
    assert!(options.provision);
    assert!(options.verify);
    assert_eq!(options.workdir, PathBuf::from("/var/lib/dockside"));
    assert_eq!(options.settle, Duration::from_secs(2));
}

#[test]
fn rejects_unknown_keys() {
    let err = Settings::from_yaml("repository: x\ntoken: secret\n").unwrap_err();
    assert!(matches!(err, Error::Yaml(_)));
}

#[test]
fn defaults_for_run_options() {
    let options = Settings::default().run_options();

    assert!(!options.provision);
    assert!(!options.verify);
    assert_eq!(options.workdir, PathBuf::from("."));
    assert_eq!(options.settle, Duration::from_secs(5));
}

#[test]
fn flags_override_file() {
    let file = Settings::from_yaml(FULL).unwrap();
    let flags = Settings {
        port: Some(9000),
        domain: Some("other.example.org".into()),
        ..Settings::default()
    };

    let merged = file.merge(flags);

    assert_eq!(merged.port, Some(9000));
    assert_eq!(merged.domain.as_deref(), Some("other.example.org"));
    assert_eq!(merged.branch.as_deref(), Some("release"));
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dockside.yml");
    std::fs::write(&path, FULL).unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.server.as_deref(), Some("203.0.113.10"));

    let err = Settings::load(&dir.path().join("missing.yml")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn raw_parameters_take_token_from_env() {
    let settings = Settings::from_yaml(FULL).unwrap();

    let raw = settings
        .to_raw(|key| (key == "ACME_TOKEN").then(|| "ghp_x".to_string()))
        .unwrap();

    assert_eq!(raw.auth_token.unwrap().expose(), "ghp_x");
    assert_eq!(raw.branch.as_deref(), Some("release"));
    assert_eq!(raw.app_port, 8080);
}

#[test]
fn missing_token_env() {
    let settings = Settings::from_yaml(FULL).unwrap();

    let err = settings.to_raw(|_| None).unwrap_err();

    assert!(matches!(err, Error::Validation { field: "token", .. }));
}

#[test]
fn render_inputs_need_no_credentials() {
    let settings = Settings::from_yaml(
        "repository: https://github.com/acme/MyApp.git\nport: 3000\ndomain: App.Example.com\n",
    )
    .unwrap();

    let (name, port, domain) = settings.render_inputs().unwrap();

    assert_eq!(name, "myapp");
    assert_eq!(port, 3000);
    assert_eq!(domain, "app.example.com");
}

#[test]
fn render_inputs_reject_bad_port() {
    let settings = Settings::from_yaml(
        "repository: https://github.com/acme/myapp.git\nport: 0\ndomain: example.com\n",
    )
    .unwrap();

    assert!(matches!(
        settings.render_inputs().unwrap_err(),
        Error::Validation { field: "port", .. }
    ));
}

#[test]
fn render_inputs_share_parameter_checks() {
    let settings = Settings::from_yaml(
        "repository: https://github.com/acme/myapp.git\nport: 70000\ndomain: example.com\n",
    )
    .unwrap();
    assert!(matches!(
        settings.render_inputs().unwrap_err(),
        Error::Validation { field: "port", .. }
    ));

    let settings = Settings::from_yaml(
        "repository: https://github.com/acme/myapp.git\nport: 8080\ndomain: localhost\n",
    )
    .unwrap();
    assert!(matches!(
        settings.render_inputs().unwrap_err(),
        Error::Validation { field: "domain", .. }
    ));
}
