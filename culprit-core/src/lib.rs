//! culprit core library: commit graph metrics and bug-introducing commit tracing.
//!
//! [`graph::GraphBuilder`] turns a repository into a [`graph::GraphBuild`]
//! (vertices, topological order, frozen first-parent choice and one
//! [`types::CommitMetrics`] row per commit). [`trace::BugIntroducingTracer`]
//! walks blame history backwards from a fixing commit's changed lines.
//! Both reach git only through [`repo::RepositoryAccess`].

pub mod config;
pub mod error;
pub mod graph;
pub mod progress;
pub mod repo;
pub mod store;
pub mod trace;
pub mod types;

pub use culprit_patch::{score_defect_risk, score_patch};
