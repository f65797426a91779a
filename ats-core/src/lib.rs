#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::unused_self)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]

//! # ATS Core
//!
//! Storage-agnostic core of the attestation storage engine: a persistent
//! store for small, uniform records called attestations, together with the
//! query, aggregation, bounded-retention, and vector-search subsystems that
//! operate on them.
//!
//! ## Core Concepts
//!
//! - **Attestation**: who said what about whom, in what context —
//!   (subjects, predicates, contexts, actors) plus a timestamp, free-form
//!   attributes, and an opaque ID.
//! - **Bounded Store**: post-insert quota enforcement across three
//!   independent dimensions, with LRU/LFU-style eviction.
//! - **Query Executor**: a filter-to-SQL compiler covering alias expansion,
//!   natural-language predicate mapping, and numeric OVER thresholds.
//! - **Embedding Store**: dense-vector persistence with nearest-neighbour
//!   search and cluster lifecycle bookkeeping (clustering algorithms
//!   themselves are out of scope; this engine only persists their outputs).
//! - **Rich Search**: typo-tolerant fuzzy search over attribute fields
//!   declared searchable by type-definition attestations.
//!
//! ## Module Organization
//!
//! ### Primary APIs
//! - [`executor`]: the query pipeline (alias expansion → NL mapping → OVER
//!   comparison → construction → execution)
//! - [`bounded`]: post-insert quota enforcement
//! - [`embeddings`]: embedding persistence, nearest-neighbour search, cluster
//!   lifecycle
//! - [`richsearch`]: fuzzy search over rich-text attribute fields
//! - [`alias`]: bidirectional alias resolution
//! - [`batch`]: ingestion-item → attestation conversion and batch persistence
//!
//! ### Support Modules
//! - [`types`]: data model shared across the engine
//! - [`traits`]: storage-backend and capability seams
//! - [`query`]: pure WHERE-fragment construction
//! - [`codec`]: facet/attribute (de)serialization
//! - [`warnings`]: predictive rate/acceleration quota warnings
//! - [`config`]: TOML-loadable engine configuration
//! - [`constants`]: built-in numeric defaults
//! - [`error`]: error kinds and the crate-wide `Result` alias
//!
//! This crate never opens a connection itself; a concrete backend crate
//! (e.g. `ats-storage-sqlite`) implements the `*Backend` traits in
//! [`traits`] against a real embedded SQL engine.

pub mod alias;
pub mod batch;
pub mod bounded;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod query;
pub mod richsearch;
pub mod traits;
pub mod types;
pub mod warnings;

pub use error::{Error, Result};
