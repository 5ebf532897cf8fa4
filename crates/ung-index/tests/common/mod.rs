#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use ung_core::{BuildParams, BuildScenario, LabelType};
use ung_store::LabeledStore;

pub const DIM: usize = 8;
pub const NUM_LABELS: LabelType = 5;

/// Uniform vectors; each label is drawn independently with probability 0.3.
pub fn random_base(n: usize, seed: u64) -> LabeledStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut store = LabeledStore::with_capacity(DIM, n);
    for _ in 0..n {
        let vector: Vec<f32> = (0..DIM).map(|_| rng.gen()).collect();
        let mut labels: Vec<LabelType> = (1..=NUM_LABELS).filter(|_| rng.gen_bool(0.3)).collect();
        if labels.is_empty() {
            labels.push(rng.gen_range(1..=NUM_LABELS));
        }
        store.push(&vector, labels).unwrap();
    }
    store
}

/// Queries with one or two distinct labels.
pub fn random_queries(n: usize, seed: u64) -> LabeledStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut store = LabeledStore::with_capacity(DIM, n);
    for _ in 0..n {
        let vector: Vec<f32> = (0..DIM).map(|_| rng.gen()).collect();
        let amount = rng.gen_range(1..=2);
        let labels = sample(&mut rng, NUM_LABELS as usize, amount)
            .into_iter()
            .map(|l| l as LabelType + 1);
        store.push(&vector, labels).unwrap();
    }
    store
}

/// Queries carrying the label sets of base vectors, so equality has matches.
pub fn queries_from_base(base: &LabeledStore, n: usize, seed: u64) -> LabeledStore {
    use ung_store::VectorStorage;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut store = LabeledStore::with_capacity(DIM, n);
    for _ in 0..n {
        let vector: Vec<f32> = (0..DIM).map(|_| rng.gen()).collect();
        let id = rng.gen_range(0..base.len()) as u32;
        store.push(&vector, base.label_set(id).iter().copied()).unwrap();
    }
    store
}

pub fn build_params(scenario: BuildScenario, num_threads: usize) -> BuildParams {
    BuildParams {
        scenario,
        max_degree: 16,
        l_build: 64,
        alpha: 1.2,
        num_cross_edges: 6,
        num_threads,
        seed: 7,
        ..BuildParams::default()
    }
}
