//! # ragd-core
//!
//! Pure retrieval logic for `ragd`: data models, chunking strategies, store
//! trait contracts, boolean query parsing, hybrid search, citation
//! validation, and context assembly.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other native-only
//! dependencies. Concrete storage, extraction, and embedding backends live
//! in the `ragd` application crate and are injected through the trait
//! contracts defined in [`store`] and [`embedding`].

pub mod chunk;
pub mod citation;
pub mod context;
pub mod embedding;
pub mod models;
pub mod query;
pub mod search;
pub mod store;
