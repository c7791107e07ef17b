//! Test: steps run in ascending step-number order

use crate::helpers::*;
use backhaul::execution::{DisableToggles, StepStatus};
use backhaul::StepKind;
use std::sync::Arc;
use tempfile::TempDir;

/// Backup first, then the MySQL dumps, for a remote source
#[tokio::test]
async fn test_backup_then_mysql_dumps() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("backups");
    let yaml = format!(
        r#"
options:
  target: {target}
sources:
  source:
    - path: example.com:/var/www
databases:
  mysql:
    - {{ name: shop, user: root, password: pw }}
pipeline:
  - {{ no: 2, step: mysql-dbs }}
  - {{ no: 1, step: backup }}
"#,
        target = target.display()
    );
    let config = resolve(&write_config(dir.path(), "backup.yaml", &yaml));
    let runner = Arc::new(RecordingRunner::new());

    let report = run_with(&config, runner.clone(), DisableToggles::default()).await;

    assert_eq!(runner.tools(), vec!["rsync", "mysqldump"]);
    let steps: Vec<(u32, StepKind, StepStatus)> =
        report.steps.iter().map(|s| (s.no, s.kind, s.status)).collect();
    assert_eq!(
        steps,
        vec![
            (1, StepKind::Backup, StepStatus::Completed),
            (2, StepKind::MySqlDump, StepStatus::Completed)
        ]
    );

    let files = target.join("example.com/files/var/www");
    let backup = target.join("example.com/backup/var/www");
    assert!(files.is_dir());
    assert!(backup.is_dir());

    let rsync = &runner.calls_to("rsync")[0];
    assert_eq!(
        rsync.argv,
        vec![
            "rsync".to_string(),
            "-az".to_string(),
            "--delete".to_string(),
            "--backup".to_string(),
            format!("--backup-dir={}", backup.display()),
            "example.com:/var/www".to_string(),
            format!("{}/", files.display()),
        ]
    );
}

#[tokio::test]
async fn test_scripts_follow_numeric_not_document_order() {
    let dir = TempDir::new().unwrap();
    let config = resolve(&write_config(
        dir.path(),
        "backup.yaml",
        r#"
scripts:
  - { id: 1, command: "first" }
  - { id: 2, command: "second" }
  - { id: 3, command: "third" }
pipeline:
  - { no: 30, step: script-1 }
  - { no: 4, step: script-3 }
  - { no: 12, step: script-2 }
"#,
    ));
    let runner = Arc::new(RecordingRunner::new());

    let report = run_with(&config, runner.clone(), DisableToggles::default()).await;

    assert_eq!(runner.tools(), vec!["third", "second", "first"]);
    let order: Vec<u32> = report.steps.iter().map(|s| s.no).collect();
    assert_eq!(order, vec![4, 12, 30]);
}

#[tokio::test]
async fn test_implicit_backup_step() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("backups");
    let config = resolve(&write_config(
        dir.path(),
        "backup.yaml",
        &format!(
            "options: {{ target: {} }}\nsources: {{ source: [ {{ path: 'host:/etc' }}, {{ path: 'host:/srv' }} ] }}\n",
            target.display()
        ),
    ));
    let runner = Arc::new(RecordingRunner::new());

    let report = run_with(&config, runner.clone(), DisableToggles::default()).await;

    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].kind, StepKind::Backup);
    let sources: Vec<String> = runner
        .calls_to("rsync")
        .iter()
        .map(|c| c.argv[c.argv.len() - 2].clone())
        .collect();
    assert_eq!(sources, vec!["host:/etc", "host:/srv"]);
}
