//! Test: credential resolution and placement for database dumps

use crate::helpers::*;
use backhaul::entity::local_hostname;
use backhaul::execution::{DisableToggles, StepStatus};
use std::sync::Arc;
use tempfile::TempDir;

fn config_yaml(target: &std::path::Path, databases: &str, pipeline: &str) -> String {
    format!(
        "options: {{ target: {} }}\ndatabases:\n{}\npipeline:\n{}\n",
        target.display(),
        databases,
        pipeline
    )
}

/// Local dump: password in the environment only
#[tokio::test]
async fn test_local_literal_password() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("backups");
    let config = resolve(&write_config(
        dir.path(),
        "backup.yaml",
        &config_yaml(
            &target,
            "  postgresql:\n    - { name: pg1, user: u, password: literalpw }",
            "  - { no: 1, step: postgresql-dbs }",
        ),
    ));
    let runner = Arc::new(RecordingRunner::new());

    let report = run_with(&config, runner.clone(), DisableToggles::default()).await;
    assert_eq!(report.failure_count(), 0);

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    let dump = &calls[0];
    assert_eq!(dump.argv, vec!["pg_dump", "--username=u", "pg1"]);
    assert_eq!(dump.env.get("PGPASSWORD").map(String::as_str), Some("literalpw"));
    assert_eq!(dump.env.len(), 1);

    let destination = dump.destination.clone().unwrap();
    let dump_dir = target
        .join(local_hostname())
        .join("db-dumps/PostgreSQL/pg1");
    assert_eq!(destination.parent().unwrap(), dump_dir.as_path());
    let file_name = destination.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("pg1_"));
    assert!(file_name.ends_with(".sql.gz"));
    assert!(destination.is_file());
}

/// Remote dump: secret looked up at dump time, placed in argv after the host
#[tokio::test]
async fn test_remote_secret_store_password() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("backups");
    let config = resolve(&write_config(
        dir.path(),
        "backup.yaml",
        &config_yaml(
            &target,
            "  mysql:\n    - { name: shop, user: root, pass: db/shop, ssh: db.example.com, options: '--single-transaction' }",
            "  - { no: 1, step: mysql-dbs }",
        ),
    ));
    let runner = Arc::new(RecordingRunner::new().with_secret("db/shop", "s3cret"));

    run_with(&config, runner.clone(), DisableToggles::default()).await;

    assert_eq!(runner.tools(), vec!["pass", "ssh"]);
    assert_eq!(runner.calls()[0].argv, vec!["pass", "show", "db/shop"]);

    let dump = &runner.calls_to("ssh")[0];
    assert_eq!(
        dump.argv,
        vec![
            "ssh",
            "db.example.com",
            "MYSQL_PWD=s3cret",
            "mysqldump",
            "--user=root",
            "--single-transaction",
            "shop"
        ]
    );
    assert!(dump.env.is_empty());
    assert!(dump
        .destination
        .as_ref()
        .unwrap()
        .starts_with(target.join("db.example.com/db-dumps/MySQL/shop")));
}

#[tokio::test]
async fn test_failed_secret_lookup_skips_that_dump_only() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("backups");
    let config = resolve(&write_config(
        dir.path(),
        "backup.yaml",
        &config_yaml(
            &target,
            "  mysql:\n    - { name: missing, user: root, pass: db/missing }\n    - { name: shop, user: root, password: pw }",
            "  - { no: 1, step: mysql-dbs }",
        ),
    ));
    let runner = Arc::new(RecordingRunner::new());

    let report = run_with(&config, runner.clone(), DisableToggles::default()).await;

    assert_eq!(runner.tools(), vec!["pass", "mysqldump"]);
    assert_eq!(report.steps[0].status, StepStatus::CompletedWithFailures(1));
    let failure = &report.steps[0].failures[0];
    assert!(failure.task.contains("missing"));
    assert!(failure.reason.contains("db/missing"));
}

#[tokio::test]
async fn test_disabled_mysql_performs_no_lookups() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("backups");
    let config = resolve(&write_config(
        dir.path(),
        "backup.yaml",
        &config_yaml(
            &target,
            "  mysql:\n    - { name: shop, user: root, pass: db/shop }\n  postgresql:\n    - { name: pg1, user: u, pass: db/pg1 }",
            "  - { no: 1, step: mysql-dbs }\n  - { no: 2, step: postgresql-dbs }",
        ),
    ));
    let runner = Arc::new(
        RecordingRunner::new()
            .with_secret("db/shop", "a")
            .with_secret("db/pg1", "b"),
    );

    let report = run_with(
        &config,
        runner.clone(),
        DisableToggles {
            mysql: true,
            ..Default::default()
        },
    )
    .await;

    assert_eq!(report.steps[0].status, StepStatus::Skipped);
    assert_eq!(runner.tools(), vec!["pass", "pg_dump"]);
    assert_eq!(runner.calls()[0].argv, vec!["pass", "show", "db/pg1"]);
}

#[tokio::test]
async fn test_all_databases_disabled() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("backups");
    let config = resolve(&write_config(
        dir.path(),
        "backup.yaml",
        &config_yaml(
            &target,
            "  mysql:\n    - { name: shop, user: root, pass: db/shop }\n  postgresql:\n    - { name: pg1, user: u, pass: db/pg1 }",
            "  - { no: 1, step: mysql-dbs }\n  - { no: 2, step: postgresql-dbs }",
        ),
    ));
    let runner = Arc::new(RecordingRunner::new());

    let report = run_with(
        &config,
        runner.clone(),
        DisableToggles {
            databases: true,
            ..Default::default()
        },
    )
    .await;

    assert!(runner.calls().is_empty());
    assert!(report.steps.iter().all(|s| s.status == StepStatus::Skipped));
}
