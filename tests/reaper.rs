mod support;

use std::{fs, sync::Arc, thread, time::Duration};

use folio::{
    application::{
        package::{DEFAULT_RETENTION, PackagePhase},
        reaper,
        registry::PROTECTED_ENTRY,
    },
    domain::path::PathEntity,
};
use support::{fake_engines, registry, write_book_tree};

#[test]
fn sweep_reclaims_expired_packages_only() {
    let workspace = tempfile::tempdir().unwrap();
    let tree = write_book_tree(&workspace.path().join("tree"), &["a.html"]);
    let registry = registry(
        &workspace.path().join("temp"),
        Duration::from_millis(20),
        fake_engines(),
    );

    let finished = registry.create_from_directory(&tree, None).unwrap();
    finished.assemble().unwrap();
    let pending = registry
        .create_from_directory(&tree, Some(&workspace.path().join("pending.zip")))
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(finished.phase(), PackagePhase::Expired);

    let report = registry.sweep().unwrap();

    assert_eq!(report.inspected, 2);
    assert_eq!(report.reclaimed, vec![finished.id().to_string()]);
    assert!(registry.lookup(finished.id()).is_none());
    assert!(!finished.temp_dir().exists());
    assert_eq!(finished.phase(), PackagePhase::Reclaimed);

    assert!(registry.lookup(pending.id()).is_some());
    assert!(pending.temp_dir().exists());
}

#[test]
fn sweep_keeps_ready_packages_within_retention() {
    let workspace = tempfile::tempdir().unwrap();
    let tree = write_book_tree(&workspace.path().join("tree"), &["a.html"]);
    let registry = registry(&workspace.path().join("temp"), DEFAULT_RETENTION, fake_engines());

    let package = registry.create_from_directory(&tree, None).unwrap();
    package.assemble().unwrap();

    let report = registry.sweep().unwrap();
    assert!(report.reclaimed.is_empty());
    assert!(registry.lookup(package.id()).is_some());
    assert!(package.temp_dir().exists());
}

#[test]
fn sweep_removes_orphans_but_not_the_readme() {
    let workspace = tempfile::tempdir().unwrap();
    let root = workspace.path().join("temp");
    let registry = registry(&root, DEFAULT_RETENTION, fake_engines());

    fs::create_dir_all(root.join("crashed-run").join("src")).unwrap();
    fs::write(root.join("crashed-run").join("src").join("a.html"), "x").unwrap();
    fs::write(root.join("stray.zip"), "x").unwrap();
    fs::write(root.join(PROTECTED_ENTRY), "workspace for package builds").unwrap();

    let tree = write_book_tree(&workspace.path().join("tree"), &["a.html"]);
    let tracked = registry.create_from_directory(&tree, None).unwrap();

    let report = registry.sweep().unwrap();

    assert_eq!(
        report.orphans,
        vec![root.join("crashed-run"), root.join("stray.zip")]
    );
    assert!(!root.join("crashed-run").exists());
    assert!(!root.join("stray.zip").exists());
    assert!(root.join(PROTECTED_ENTRY).exists());
    assert!(tracked.temp_dir().exists());
}

#[tokio::test]
async fn reaper_task_evicts_expired_packages_and_stops() {
    let workspace = tempfile::tempdir().unwrap();
    let tree = write_book_tree(&workspace.path().join("tree"), &["a.html"]);
    let registry = Arc::new(registry(
        &workspace.path().join("temp"),
        Duration::from_millis(10),
        fake_engines(),
    ));

    let package = registry.create_from_directory(&tree, None).unwrap();
    package.assemble().unwrap();

    let handle = reaper::spawn(Arc::clone(&registry), Duration::from_millis(20));

    let mut evicted = false;
    for _ in 0..100 {
        if registry.lookup(package.id()).is_none() {
            evicted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.shutdown().await;

    assert!(evicted, "package was not reclaimed by the reaper");
    assert!(!package.temp_dir().exists());
    assert!(package.output().exists(), "output beside the source survives");
}

#[tokio::test]
async fn zero_interval_is_clamped_instead_of_panicking() {
    let workspace = tempfile::tempdir().unwrap();
    let root = workspace.path().join("temp");
    let registry = Arc::new(registry(&root, DEFAULT_RETENTION, fake_engines()));
    fs::write(root.join("stray.zip"), "x").unwrap();

    let handle = reaper::spawn(Arc::clone(&registry), Duration::ZERO);

    let mut swept = false;
    for _ in 0..100 {
        if !root.join("stray.zip").exists() {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.shutdown().await;

    assert!(swept, "reaper did not run with a zero interval");
}
