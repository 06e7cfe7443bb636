//! graphtrace - execution-tree metrics aggregation and outlier trace sampling
//!
//! This library provides the aggregation core of a resolver instrumentation
//! agent: an append-only execution tree per request, a single walk that
//! merges metrics by operation identity and builds traces, and a per-identity
//! outlier sampler that keeps a bounded number of interesting traces.

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod flush;
pub mod graph;
pub mod metrics;
pub mod node_id;
pub mod outlier;
pub mod processor;
pub mod recorder;
pub mod replay;
pub mod stats;
pub mod trace;
pub mod trace_store;
