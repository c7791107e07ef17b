//! Test: snapshots archive each (target, host) files tree once

use crate::helpers::*;
use backhaul::SnapshotBuilder;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_one_archive_per_host() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("backups");
    let config = resolve(&write_config(
        dir.path(),
        "backup.yaml",
        &format!(
            r#"
options: {{ target: {} }}
sources:
  source:
    - path: web:/srv
    - path: db:/etc
      rsync: {{ root: true }}
    - path: web:/etc
"#,
            target.display()
        ),
    ));
    let runner = Arc::new(RecordingRunner::new().with_exit_code("tar", 2));

    let failures = SnapshotBuilder::new(runner.clone())
        .snapshot(&config.sources)
        .await;

    assert_eq!(failures.len(), 2);
    let calls = runner.calls_to("tar");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].argv[0], "tar");
    assert_eq!(calls[1].argv[0], "sudo");

    let web = target.join("web");
    let argv = &calls[0].argv;
    assert_eq!(argv[1], "-czf");
    assert!(argv[2].starts_with(&web.join("snapshots").to_string_lossy().into_owned()));
    assert!(argv[2].ends_with(".tar.gz"));
    assert_eq!(argv[3..], ["-C".to_string(), web.to_string_lossy().into_owned(), "files".to_string()]);
    assert!(web.join("snapshots").is_dir());
}
