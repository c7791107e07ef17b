//! Test: included documents inherit and override defaults

use crate::helpers::*;
use backhaul::execution::DisableToggles;
use backhaul::ConfigResolver;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_privileged_include_runs_under_sudo() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("backups");
    write_config(
        dir.path(),
        "hosts/system.yaml",
        r#"
options:
  rsync: "-a"
sources:
  source:
    - path: web:/etc
      exclude: ["shadow*"]
"#,
    );
    let top = write_config(
        dir.path(),
        "backup.yaml",
        &format!(
            r#"
options: {{ target: {} }}
sources:
  source:
    - path: web:/srv
  file:
    - {{ path: hosts/system.yaml, root: true }}
"#,
            target.display()
        ),
    );
    let config = resolve(&top);
    let runner = Arc::new(RecordingRunner::new());

    run_with(&config, runner.clone(), DisableToggles::default()).await;

    let calls = runner.calls_to("rsync");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].argv[0], "rsync");
    assert_eq!(
        calls[1].argv,
        vec![
            "sudo".to_string(),
            "rsync".to_string(),
            "-a".to_string(),
            "--exclude=shadow*".to_string(),
            "web:/etc".to_string(),
            format!("{}/", target.join("web/files/etc").display()),
        ]
    );
}

#[tokio::test]
async fn test_cli_target_override_reaches_included_sources() {
    let dir = TempDir::new().unwrap();
    let elsewhere = dir.path().join("elsewhere");
    write_config(dir.path(), "more.yaml", "sources: { source: [ { path: 'web:/srv' } ] }\n");
    let top = write_config(
        dir.path(),
        "backup.yaml",
        "options: { target: /nonexistent/backups }\nsources: { file: [ more.yaml ] }\n",
    );

    let config = ConfigResolver::new()
        .with_target_override(Some(elsewhere.clone()))
        .load(&top)
        .unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let report = run_with(&config, runner.clone(), DisableToggles::default()).await;

    assert_eq!(report.failure_count(), 0);
    assert_eq!(config.sources[0].target_root, elsewhere);
    assert!(elsewhere.join("web/files/srv").is_dir());
    assert_eq!(config.target, Some(PathBuf::from(&elsewhere)));
}
