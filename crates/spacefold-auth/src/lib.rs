//! # spacefold-auth
//!
//! Credential authority for spacefold: signed admission assertions and
//! the per-space state machine that derives the currently-admitted set of
//! writer keys from them.
//!
//! ## Overview
//!
//! Authorization is expressed as credentials, not mutable flags. An
//! already-admitted issuer signs an assertion about a subject key; the
//! authority replays the credential stream and owns the derived state.
//! Revocation is itself a credential — nothing is retracted implicitly.
//!
//! ## Key Properties
//!
//! - **Synchronous queries**: [`CredentialAuthority::is_admitted`] never
//!   blocks on I/O
//! - **Idempotent**: replaying an applied credential is a no-op
//! - **Gap-tolerant**: a credential whose issuer is not yet admitted is
//!   held and re-driven after later admissions, never rejected outright
//! - **Forward-compatible**: unknown assertion kinds are ignored

pub mod authority;
pub mod credential;
pub mod error;

pub use authority::{CredentialAuthority, DeviceChain, Processed};
pub use credential::{AssertionKind, Credential};
pub use error::{AuthError, Result};
