mod common;

use common::{build_params, random_base, random_queries};
use ung_core::{BuildScenario, IdxType, L2Metric, Scenario, SearchParams};
use ung_index::UniNavGraph;

#[test]
fn test_group_graphs_independent_of_thread_count() {
    let base = random_base(300, 41);
    let single =
        UniNavGraph::<L2Metric>::build(base.clone(), &build_params(BuildScenario::General, 1))
            .unwrap();
    let multi =
        UniNavGraph::<L2Metric>::build(base, &build_params(BuildScenario::General, 4)).unwrap();

    assert_eq!(single.num_groups(), multi.num_groups());
    for id in 0..single.num_points() as IdxType {
        assert_eq!(single.graph().neighbors(id), multi.graph().neighbors(id), "node {id}");
    }
    assert_eq!(single.label_nav_graph(), multi.label_nav_graph());
}

#[test]
fn test_parallel_search_matches_single_thread() {
    let base = random_base(300, 42);
    let index =
        UniNavGraph::<L2Metric>::build(base, &build_params(BuildScenario::General, 2)).unwrap();
    let queries = random_queries(64, 43);

    for scenario in [Scenario::Containment, Scenario::Overlap, Scenario::NoFilter] {
        let single = SearchParams {
            scenario,
            num_entry_points: 2,
            num_threads: 1,
            seed: 3,
            ..SearchParams::default()
        };
        let multi = SearchParams {
            num_threads: 8,
            ..single.clone()
        };
        let (a, a_stats) = index.search(&queries, &single).unwrap();
        let (b, b_stats) = index.search(&queries, &multi).unwrap();
        assert_eq!(a, b, "{scenario}");
        assert_eq!(a_stats.total_distance_calcs, b_stats.total_distance_calcs);
    }
}

#[test]
fn test_global_graph_reaches_every_node() {
    let base = random_base(300, 44);
    let index =
        UniNavGraph::<L2Metric>::build(base, &build_params(BuildScenario::General, 4)).unwrap();
    let entry = index.global_entry_point().unwrap();

    let mut seen = vec![false; index.num_points()];
    let mut stack = vec![entry];
    while let Some(id) = stack.pop() {
        if std::mem::replace(&mut seen[id as usize], true) {
            continue;
        }
        stack.extend(index.global_graph().neighbors(id));
    }
    assert!(seen.iter().all(|&s| s));
}

#[test]
fn test_search_scratch_is_kept_between_calls() {
    let base = random_base(300, 45);
    let index =
        UniNavGraph::<L2Metric>::build(base, &build_params(BuildScenario::General, 2)).unwrap();
    let queries = random_queries(40, 46);
    assert_eq!(index.num_idle_search_caches(), 0);

    let params = SearchParams {
        scenario: Scenario::Overlap,
        num_entry_points: 3,
        num_threads: 3,
        seed: 7,
        ..SearchParams::default()
    };
    let (first, _) = index.search(&queries, &params).unwrap();
    let idle = index.num_idle_search_caches();
    assert!((1..=3).contains(&idle), "{idle} idle caches");

    for scenario in [Scenario::Containment, Scenario::NoFilter, Scenario::Overlap] {
        index
            .search(&queries, &SearchParams { scenario, ..params.clone() })
            .unwrap();
    }
    let (again, _) = index.search(&queries, &params).unwrap();
    assert_eq!(first, again);
    assert!(index.num_idle_search_caches() <= 3);
}
