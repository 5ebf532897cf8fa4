use std::collections::BTreeMap;

use super::*;
use crate::label::{canonicalize, includes, intersects, parse_label_line, satisfies};
use proptest::prelude::*;

#[test]
fn test_l2_distance() {
    let a = [1.0, 2.0, 3.0];
    let b = [4.0, 5.0, 6.0];
    // diffs: -3, -3, -3. sq: 9, 9, 9.
    let dist = L2Metric::distance(&a, &b);
    assert!((dist - 27.0).abs() < f32::EPSILON);
}

#[test]
fn test_inner_product_and_cosine() {
    let a = [1.0, 0.0];
    let b = [0.0, 1.0];
    assert!(InnerProductMetric::distance(&a, &b).abs() < f32::EPSILON);
    assert!((InnerProductMetric::distance(&a, &a) + 1.0).abs() < f32::EPSILON);

    assert!((CosineMetric::distance(&a, &b) - 1.0).abs() < 1e-6);
    assert!(CosineMetric::distance(&a, &a).abs() < 1e-6);
    let c = [-1.0, 0.0];
    assert!((CosineMetric::distance(&a, &c) - 2.0).abs() < 1e-6);
}

#[test]
fn test_includes_and_intersects() {
    assert!(includes(&[1, 2, 3], &[1, 3]));
    assert!(includes(&[1, 2, 3], &[]));
    assert!(!includes(&[1, 3], &[2]));
    assert!(!includes(&[1], &[1, 2]));
    assert!(intersects(&[1, 4, 9], &[2, 9]));
    assert!(!intersects(&[1, 4], &[2, 3]));
    assert!(!intersects(&[], &[1]));
}

#[test]
fn test_satisfies_per_scenario() {
    let q = [1, 2];
    assert!(satisfies(Scenario::Equality, &q, &[1, 2]));
    assert!(!satisfies(Scenario::Equality, &q, &[1, 2, 3]));
    assert!(satisfies(Scenario::Containment, &q, &[1, 2, 3]));
    assert!(!satisfies(Scenario::Containment, &q, &[2, 3]));
    assert!(satisfies(Scenario::Overlap, &q, &[2, 3]));
    assert!(!satisfies(Scenario::Overlap, &q, &[3]));
    assert!(satisfies(Scenario::NoFilter, &q, &[]));
}

#[test]
fn test_parse_label_line() {
    assert_eq!(parse_label_line("3,1,3").unwrap().as_slice(), &[1, 3]);
    assert!(parse_label_line("").unwrap().is_empty());
    assert!(parse_label_line("1,x").is_none());
}

#[test]
fn test_scenario_parsing() {
    assert_eq!("containment".parse::<BuildScenario>().unwrap(), BuildScenario::General);
    assert_eq!("equality".parse::<BuildScenario>().unwrap(), BuildScenario::Equality);
    assert_eq!("nofilter".parse::<Scenario>().unwrap(), Scenario::NoFilter);
    assert!(matches!(
        "subset".parse::<Scenario>(),
        Err(UngError::UnknownScenario(_))
    ));
    assert!(matches!(
        "HNSW".parse::<IndexType>(),
        Err(UngError::UnknownIndexType(_))
    ));
}

#[test]
fn test_param_validation() {
    let search = SearchParams {
        k: 20,
        l_search: 10,
        ..SearchParams::default()
    };
    assert!(matches!(
        search.validate(),
        Err(UngError::KExceedsSearchList { k: 20, l_search: 10 })
    ));

    let build = BuildParams {
        num_cross_edges: 200,
        l_build: 100,
        ..BuildParams::default()
    };
    assert!(matches!(
        build.validate(),
        Err(UngError::CrossEdgesExceedBuildList { .. })
    ));

    // Equality builds never create cross edges.
    let equality = BuildParams {
        scenario: BuildScenario::Equality,
        num_cross_edges: 0,
        ..BuildParams::default()
    };
    assert!(equality.validate().is_ok());
}

#[test]
fn test_build_params_from_json() {
    let params = BuildParams::from_json(r#"{"scenario":"containment","max_degree":2}"#).unwrap();
    assert_eq!(params.scenario, BuildScenario::General);
    assert_eq!(params.max_degree, 2);
    assert_eq!(params.l_build, config::DEFAULT_L_BUILD);
}

#[test]
fn test_build_stats_meta_round_trip() {
    let stats = BuildStats {
        num_points: 6,
        num_groups: 4,
        build_graph_ms: 1.5,
        index_time_ms: 9.25,
        graph_num_edges: 17,
        lng_num_edges: 3,
        ..BuildStats::default()
    };
    let mut meta: BTreeMap<String, String> = stats.meta_entries().into_iter().collect();
    meta.insert("num_points".into(), "6".into());
    meta.insert("num_groups".into(), "4".into());
    assert_eq!(BuildStats::from_meta(&meta).unwrap(), stats);
}

#[test]
fn test_build_stats_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("build_time.csv");
    BuildStats::default().write_csv(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("Index Name,Build Time (ms)"));
    assert!(text.contains("build_cross_edges_time,0"));
}

#[test]
fn test_search_stats_combine_accumulates() {
    let mut a = SearchStats::default();
    a.record(QueryStats {
        time_ms: 2.0,
        num_distance_calcs: 10,
        num_results: 1,
        is_global_search: true,
        ..QueryStats::default()
    });
    let mut b = SearchStats::default();
    b.record(QueryStats {
        time_ms: 5.0,
        num_distance_calcs: 4,
        recall: Some(0.5),
        ..QueryStats::default()
    });

    a.combine(&b);
    assert_eq!(a.num_queries, 2);
    assert_eq!(a.num_empty_queries, 1);
    assert_eq!(a.num_global_searches, 1);
    assert_eq!(a.total_distance_calcs, 14);
    assert_eq!(a.max_distance_calcs, 10);
    assert!((a.total_time_ms - 7.0).abs() < 1e-9);
    assert!((a.max_time_ms - 5.0).abs() < 1e-9);
    assert_eq!(a.mean_recall(), Some(0.5));
    assert_eq!(a.queries.len(), 2);
    assert!(a.to_json().unwrap().contains("total_distance_calcs"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_includes_matches_set_semantics(
        a in proptest::collection::vec(0u32..16, 0..8),
        b in proptest::collection::vec(0u32..16, 0..8),
    ) {
        let a = canonicalize(a);
        let b = canonicalize(b);
        let expected = b.iter().all(|x| a.contains(x));
        prop_assert_eq!(includes(&a, &b), expected);
        let overlap = b.iter().any(|x| a.contains(x));
        prop_assert_eq!(intersects(&a, &b), overlap);
    }
}
