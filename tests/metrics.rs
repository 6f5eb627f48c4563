mod support;

use std::{collections::HashSet, fs, thread, time::Duration};

use metrics_util::debugging::DebuggingRecorder;
use support::{fake_engines, registry, write_book_tree};

#[test]
fn package_lifecycle_emits_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let workspace = tempfile::tempdir().unwrap();
    let root = workspace.path().join("temp");
    let registry = registry(&root, Duration::ZERO, fake_engines());

    // Created, built, then reclaimed once retention has passed.
    let tree = write_book_tree(&workspace.path().join("tree"), &["a.html"]);
    let package = registry
        .create_from_source(&tree, Some(&workspace.path().join("out.zip")))
        .expect("package created");
    package.assemble().expect("package built");

    fs::write(root.join("leftover.zip"), b"stale").unwrap();
    thread::sleep(Duration::from_millis(5));
    let report = registry.sweep().expect("sweep");
    assert_eq!(report.reclaimed, vec![package.id().to_string()]);
    assert_eq!(report.orphans.len(), 1);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "folio_packages_created_total",
        "folio_packages_ready_total",
        "folio_package_build_ms",
        "folio_packages_reclaimed_total",
        "folio_orphans_removed_total",
        "folio_registry_packages",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
