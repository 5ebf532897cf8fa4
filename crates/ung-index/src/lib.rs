#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

//! Filtered approximate nearest neighbor search over labelled vectors.
//!
//! [`UniNavGraph`] partitions the base vectors by label set, builds one
//! proximity graph per group and, for general builds, links the groups
//! along the [`LabelNavGraph`] so a single traversal can serve equality,
//! containment, overlap and unfiltered queries.

pub mod cache;
pub mod graph;
pub mod ground_truth;
pub mod lng;
pub mod search_queue;
pub mod trie;
pub mod uni_nav_graph;
pub mod vamana;
pub mod visited;

pub use cache::{SearchCache, SearchCachePool};
pub use graph::Graph;
pub use lng::LabelNavGraph;
pub use search_queue::SearchQueue;
pub use trie::LabelTrie;
pub use uni_nav_graph::{IndexStatistics, SearchResults, UniNavGraph};
pub use visited::VisitedSet;
