//! # spacefold-testkit
//!
//! Testing utilities for spacefold.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: deterministic writers that share a space and sign
//!   well-formed entries and credentials
//! - **Generators**: proptest strategies for property-based testing
//! - **Golden vectors**: known entry constructions pinning the canonical
//!   encoding across implementations
//!
//! ## Fixtures
//!
//! ```rust
//! use spacefold_testkit::fixtures::{multi_writer_fixtures, TestWriter};
//! use spacefold_core::{MutationBatch, ObjectId};
//!
//! let (founder, writers) = multi_writer_fixtures(2);
//! let batch = MutationBatch::genesis(ObjectId::random(), "record", b"{}".to_vec());
//! let entry = writers[0].make_mutation(0, &batch);
//! let admit = founder.admit(writers[0].public_key());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use spacefold_testkit::generators::{entry_from_params, EntryParams};
//!
//! proptest! {
//!     #[test]
//!     fn entry_hash_is_deterministic(params: EntryParams) {
//!         let a = entry_from_params(&params);
//!         let b = entry_from_params(&params);
//!         prop_assert_eq!(a.content_hash(), b.content_hash());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_writer_fixtures, TestWriter};
pub use generators::{entry_from_params, EntryParams};
pub use vectors::{
    all_vectors, entry_from_vector, report_vector, vectors_to_json, verify_all_vectors,
    GoldenVector, VectorReport,
};
