//! End-to-end updater tests against cgroup trees on disk
//!
//! Run with: cargo test --package rex-executor --test merge_tests

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rex_executor::{
    new_common_default_updater, Auditor, MemoryAuditSink, UpdaterEnv, UpdaterError,
    UpdaterFactory, ValueSide, REASON_UPDATE_CGROUPS,
};
use rex_system::{CgroupVersion, ResourceType};
use rex_test_utils::{memory_cgroup_fs, CgroupTree};
use std::borrow::Cow;
use std::sync::Arc;

fn factory(tree: &CgroupTree) -> UpdaterFactory {
    UpdaterFactory::with_defaults(UpdaterEnv::from_cgroup_fs(tree.host_fs()))
}

#[test]
fn memory_min_merge_only_raises() {
    let tree = CgroupTree::new(CgroupVersion::V1);
    tree.file("memory/kubepods/memory.min", "100\n");
    let factory = factory(&tree);

    let lower = factory
        .new_updater(&ResourceType::MEMORY_MIN, "kubepods", "50")
        .unwrap();
    let outcome = lower.merge_update().unwrap();
    assert!(!outcome.written);
    assert_eq!(outcome.value(), "100");
    assert_eq!(tree.read("memory/kubepods/memory.min"), "100");

    let higher = factory
        .new_updater(&ResourceType::MEMORY_MIN, "kubepods", "200")
        .unwrap();
    let outcome = higher.merge_update().unwrap();
    assert!(outcome.written);
    assert!(matches!(outcome.updater, Cow::Borrowed(_)));
    assert_eq!(tree.read("memory/kubepods/memory.min"), "200");
}

#[test]
fn cpuset_reconcile_top_down_then_bottom_up() {
    let tree = CgroupTree::new(CgroupVersion::V1);
    tree.file("cpuset/kubepods/cpuset.cpus", "0-3");
    tree.file("cpuset/kubepods/pod1/cpuset.cpus", "0-1");
    let factory = factory(&tree);

    let parent = factory
        .new_updater(&ResourceType::CPUSET_CPUS, "kubepods", "4-5")
        .unwrap();
    let child = factory
        .new_updater(&ResourceType::CPUSET_CPUS, "kubepods/pod1", "4-5")
        .unwrap();

    // Top-down: the parent is widened before the child moves
    let outcome = parent.merge_update().unwrap();
    assert!(outcome.written);
    assert_eq!(tree.read("cpuset/kubepods/cpuset.cpus"), "0-5");

    let outcome = child.merge_update().unwrap();
    assert!(outcome.written);
    assert_eq!(tree.read("cpuset/kubepods/pod1/cpuset.cpus"), "0-1,4-5");

    // Bottom-up: settle on the exact values
    assert!(child.update().unwrap());
    assert!(parent.update().unwrap());
    assert_eq!(tree.read("cpuset/kubepods/pod1/cpuset.cpus"), "4-5");
    assert_eq!(tree.read("cpuset/kubepods/cpuset.cpus"), "4-5");
}

#[test]
fn cpuset_subset_is_not_rewritten() {
    let tree = CgroupTree::new(CgroupVersion::V1);
    tree.file("cpuset/kubepods/cpuset.cpus", "0-7");
    let factory = factory(&tree);

    let outcome_value = {
        let u = factory
            .new_updater(&ResourceType::CPUSET_CPUS, "kubepods", "2-3")
            .unwrap();
        let outcome = u.merge_update().unwrap();
        assert!(!outcome.written);
        outcome.into_owned()
    };

    assert_eq!(outcome_value.value(), "0-7");
    assert_eq!(tree.read("cpuset/kubepods/cpuset.cpus"), "0-7");
}

#[test]
fn v2_unlimited_value_matches_kernel_rendering() {
    let tree = CgroupTree::new(CgroupVersion::V2);
    tree.file("kubepods/memory.max", "9223372036854771712");
    let factory = factory(&tree);

    let u = factory
        .new_updater(&ResourceType::MEMORY_LIMIT, "kubepods", "max")
        .unwrap();
    assert_eq!(u.path(), tree.root().join("kubepods/memory.max"));
    assert!(!u.update().unwrap());
}

#[test]
fn v2_int64_max_matches_symbolic_max() {
    let tree = CgroupTree::new(CgroupVersion::V2);
    tree.file("kubepods/memory.max", "max\n");
    let factory = factory(&tree);

    let u = factory
        .new_updater(&ResourceType::MEMORY_LIMIT, "kubepods", "9223372036854775807")
        .unwrap();
    assert!(!u.update().unwrap());
    assert_eq!(tree.read("kubepods/memory.max"), "max");
}

#[test]
fn v2_merge_rejects_symbolic_max() {
    let tree = CgroupTree::new(CgroupVersion::V2);
    tree.file("kubepods/memory.min", "0");
    let factory = factory(&tree);

    let u = factory
        .new_updater(&ResourceType::MEMORY_MIN, "kubepods", "max")
        .unwrap();
    match u.merge_update().unwrap_err() {
        UpdaterError::Policy { source, .. } => assert_eq!(source.side, ValueSide::New),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(tree.read("kubepods/memory.min"), "0");
}

#[test]
fn v2_kind_without_file_is_not_found() {
    let tree = CgroupTree::new(CgroupVersion::V2);
    let factory = factory(&tree);

    let err = factory
        .new_updater(&ResourceType::CPU_CFS_QUOTA, "kubepods", "1000")
        .unwrap_err();
    assert!(err.is_construction());
}

#[test]
fn missing_cgroup_is_read_error() {
    let tree = CgroupTree::new(CgroupVersion::V1);
    let factory = factory(&tree);

    let u = factory
        .new_updater(&ResourceType::MEMORY_LOW, "kubepods/gone", "10")
        .unwrap();
    let err = u.merge_update().unwrap_err();
    assert!(matches!(err, UpdaterError::Read { .. }));
    assert!(err.is_io());
}

#[test]
fn invalid_value_is_rejected_before_read() {
    let tree = CgroupTree::new(CgroupVersion::V1);
    tree.file("cpuset/kubepods/cpuset.cpus", "0-3");
    let factory = factory(&tree);

    let u = factory
        .new_updater(&ResourceType::CPUSET_CPUS, "kubepods", "5-2")
        .unwrap();
    assert!(matches!(
        u.merge_update().unwrap_err(),
        UpdaterError::InvalidValue { .. }
    ));
    assert_eq!(tree.read("cpuset/kubepods/cpuset.cpus"), "0-3");
}

#[test]
fn oversized_cpuset_is_rejected_before_read() {
    let tree = CgroupTree::new(CgroupVersion::V1);
    tree.file("cpuset/kubepods/cpuset.cpus", "0-3");
    let factory = factory(&tree);

    let u = factory
        .new_updater(&ResourceType::CPUSET_CPUS, "kubepods", "0-4294967295")
        .unwrap();
    assert!(matches!(
        u.merge_update().unwrap_err(),
        UpdaterError::InvalidValue { .. }
    ));
    assert_eq!(tree.read("cpuset/kubepods/cpuset.cpus"), "0-3");
}

#[test]
fn default_updater_writes_plain_file() {
    let tree = CgroupTree::new(CgroupVersion::V1);
    let path = tree.file("sys/vm/min_free_kbytes", "67584");
    let env = UpdaterEnv::from_cgroup_fs(tree.host_fs());

    let dir = path.parent().unwrap().to_path_buf();
    let u = new_common_default_updater(&env, "min_free_kbytes", dir, "90000");
    assert!(u.update().unwrap());
    assert!(!u.update().unwrap());
    assert_eq!(tree.read("sys/vm/min_free_kbytes"), "90000");
}

#[test]
fn merge_audits_written_value() {
    let tree = CgroupTree::new(CgroupVersion::V1);
    tree.file("memory/kubepods/memory.high", "10");
    let sink = Arc::new(MemoryAuditSink::new(8, 5));
    let env = UpdaterEnv::from_cgroup_fs(tree.host_fs()).with_auditor(Auditor::new(sink.clone()));
    let factory = UpdaterFactory::with_defaults(env);

    let skip = factory
        .new_updater(&ResourceType::MEMORY_HIGH, "kubepods", "5")
        .unwrap();
    skip.merge_update().unwrap();
    assert!(sink.is_empty());

    let write = factory
        .new_updater(&ResourceType::MEMORY_HIGH, "kubepods", "20")
        .unwrap();
    write.merge_update().unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, REASON_UPDATE_CGROUPS);
    assert_eq!(
        events[0].message,
        format!("update {} to 20", write.path().display())
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_repeated_merges_never_lower_memory_min(
        initial in 0i64..1_000_000,
        requests in proptest::collection::vec(0i64..1_000_000, 1..16),
    ) {
        let (files, fs) = memory_cgroup_fs(CgroupVersion::V1);
        let path = "/cg/memory/kubepods/memory.min";
        files.set(path, &initial.to_string());
        let factory = UpdaterFactory::with_defaults(UpdaterEnv::from_cgroup_fs(fs));

        let mut floor = initial;
        for request in requests {
            let u = factory
                .new_updater(&ResourceType::MEMORY_MIN, "kubepods", &request.to_string())
                .unwrap();
            let outcome = u.merge_update().unwrap();

            let stored: i64 = files.get(path).unwrap().parse().unwrap();
            prop_assert!(stored >= floor);
            prop_assert_eq!(stored, floor.max(request));
            prop_assert_eq!(outcome.value().parse::<i64>().unwrap(), stored);
            floor = stored;
        }
    }

    #[test]
    fn prop_repeated_merges_never_shrink_cpuset(
        requests in proptest::collection::vec(
            proptest::collection::btree_set(0usize..32, 1..6),
            1..8,
        ),
    ) {
        let (files, fs) = memory_cgroup_fs(CgroupVersion::V1);
        let path = "/cg/cpuset/kubepods/cpuset.cpus";
        files.set(path, "");
        let factory = UpdaterFactory::with_defaults(UpdaterEnv::from_cgroup_fs(fs));

        let mut seen = rex_cpuset::CpuSet::new();
        for request in requests {
            let request: rex_cpuset::CpuSet = request.into_iter().collect();
            let u = factory
                .new_updater(&ResourceType::CPUSET_CPUS, "kubepods", &request.to_string())
                .unwrap();
            u.merge_update().unwrap();

            let stored = rex_cpuset::CpuSet::parse(&files.get(path).unwrap()).unwrap();
            prop_assert!(seen.is_subset_of(&stored));
            prop_assert!(request.is_subset_of(&stored));
            seen = stored;
        }
    }
}
