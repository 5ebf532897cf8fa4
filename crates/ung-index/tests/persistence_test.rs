mod common;

use common::{build_params, queries_from_base, random_base};
use tempfile::tempdir;
use ung_core::{
    BuildScenario, HybridParams, InnerProductMetric, L2Metric, Scenario, SearchParams, UngError,
};
use ung_index::UniNavGraph;

#[test]
fn test_round_trip_gives_identical_results() {
    let base = random_base(300, 21);
    let queries = queries_from_base(&base, 20, 22);
    let index =
        UniNavGraph::<L2Metric>::build(base, &build_params(BuildScenario::General, 2)).unwrap();

    let dir = tempdir().unwrap();
    index.save(dir.path()).unwrap();
    let loaded = UniNavGraph::<L2Metric>::load(dir.path()).unwrap();

    assert_eq!(loaded.params(), index.params());
    assert_eq!(loaded.build_stats(), index.build_stats());
    assert_eq!(loaded.num_groups(), index.num_groups());
    assert_eq!(loaded.global_entry_point(), index.global_entry_point());
    assert_eq!(loaded.label_nav_graph(), index.label_nav_graph());
    assert_eq!(loaded.statistics(), index.statistics());
    assert_eq!(
        loaded.vector_attr_graph().compute_checksum(),
        index.vector_attr_graph().compute_checksum()
    );

    for scenario in [
        Scenario::Equality,
        Scenario::Containment,
        Scenario::Overlap,
        Scenario::NoFilter,
    ] {
        let params = SearchParams {
            scenario,
            num_entry_points: 4,
            seed: 5,
            ..SearchParams::default()
        };
        let (before, _) = index.search(&queries, &params).unwrap();
        let (after, _) = loaded.search(&queries, &params).unwrap();
        assert_eq!(before, after, "{scenario}");

        let hybrid = HybridParams::default();
        let bitmaps = index.query_bitmaps(&queries, scenario);
        assert_eq!(bitmaps, loaded.query_bitmaps(&queries, scenario));
        let bitmaps = Some(bitmaps.as_slice());
        let (before, _) = index.search_hybrid(&queries, &params, &hybrid, bitmaps).unwrap();
        let (after, _) = loaded.search_hybrid(&queries, &params, &hybrid, bitmaps).unwrap();
        assert_eq!(before, after, "hybrid {scenario}");
    }
}

#[test]
fn test_round_trip_equality_build() {
    let base = random_base(200, 23);
    let queries = queries_from_base(&base, 10, 24);
    let index =
        UniNavGraph::<L2Metric>::build(base, &build_params(BuildScenario::Equality, 1)).unwrap();

    let dir = tempdir().unwrap();
    index.save(dir.path()).unwrap();
    assert!(!dir.path().join("lng_out_neighbors").exists());
    let loaded = UniNavGraph::<L2Metric>::load(dir.path()).unwrap();
    assert!(loaded.label_nav_graph().is_none());

    let params = SearchParams {
        scenario: Scenario::Equality,
        ..SearchParams::default()
    };
    assert_eq!(
        index.search(&queries, &params).unwrap().0,
        loaded.search(&queries, &params).unwrap().0
    );
}

#[test]
fn test_load_rejects_other_metric() {
    let index = UniNavGraph::<L2Metric>::build(
        random_base(50, 25),
        &build_params(BuildScenario::General, 1),
    )
    .unwrap();
    let dir = tempdir().unwrap();
    index.save(dir.path()).unwrap();

    let err = UniNavGraph::<InnerProductMetric>::load(dir.path()).unwrap_err();
    assert!(matches!(err, UngError::MetricMismatch { .. }));
}

#[test]
fn test_load_fails_on_missing_or_inconsistent_files() {
    let index = UniNavGraph::<L2Metric>::build(
        random_base(100, 26),
        &build_params(BuildScenario::General, 1),
    )
    .unwrap();

    let dir = tempdir().unwrap();
    index.save(dir.path()).unwrap();
    std::fs::remove_file(dir.path().join("graph")).unwrap();
    let err = UniNavGraph::<L2Metric>::load(dir.path()).unwrap_err();
    assert!(matches!(err, UngError::Io { .. }), "{err}");

    let dir = tempdir().unwrap();
    index.save(dir.path()).unwrap();
    ung_store::io::write_roaring_vec(&dir.path().join("lng_descendants_rb.bin"), &[]).unwrap();
    let err = UniNavGraph::<L2Metric>::load(dir.path()).unwrap_err();
    assert!(matches!(err, UngError::Corrupt { .. }), "{err}");

    let dir = tempdir().unwrap();
    index.save(dir.path()).unwrap();
    ung_store::io::write_u32_vec(&dir.path().join("new_to_old_vec_ids"), &[0, 0, 1]).unwrap();
    let err = UniNavGraph::<L2Metric>::load(dir.path()).unwrap_err();
    assert!(matches!(err, UngError::Corrupt { .. }), "{err}");

    let dir = tempdir().unwrap();
    index.save(dir.path()).unwrap();
    let path = dir.path().join("vector_attr_graph");
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();
    let err = UniNavGraph::<L2Metric>::load(dir.path()).unwrap_err();
    assert!(matches!(err, UngError::ChecksumMismatch { .. }), "{err}");
}

#[test]
fn test_load_checks_group_label_sets_against_trie() {
    let index = UniNavGraph::<L2Metric>::build(
        random_base(100, 27),
        &build_params(BuildScenario::General, 1),
    )
    .unwrap();
    assert!(index.num_groups() >= 2);
    let file = "group_id_to_label_set";

    let dir = tempdir().unwrap();
    index.save(dir.path()).unwrap();
    let mut sets = ung_store::io::read_u32_table(&dir.path().join(file)).unwrap();
    sets.swap(1, 2);
    ung_store::io::write_u32_table(&dir.path().join(file), &sets).unwrap();
    let err = UniNavGraph::<L2Metric>::load(dir.path()).unwrap_err();
    assert!(matches!(err, UngError::Corrupt { .. }), "{err}");

    let dir = tempdir().unwrap();
    index.save(dir.path()).unwrap();
    let mut sets = ung_store::io::read_u32_table(&dir.path().join(file)).unwrap();
    let row = sets.iter().position(|s| s.len() >= 2).unwrap();
    sets[row].reverse();
    ung_store::io::write_u32_table(&dir.path().join(file), &sets).unwrap();
    let err = UniNavGraph::<L2Metric>::load(dir.path()).unwrap_err();
    assert!(matches!(err, UngError::Corrupt { .. }), "{err}");
}
