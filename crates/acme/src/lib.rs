//! ACME certificate issuance over DNS-01.
//!
//! The applier resolves (or registers) an account for `(email, ca)`,
//! publishes TXT challenge records through a DNS provider adapter,
//! pre-checks propagation, finalizes the order with a locally generated
//! key, and persists the issued bundle with sha-256 dedup. Valid cached
//! certificates covering the requested domain set are reused instead of
//! re-issuing.

pub mod account;
pub mod applier;
pub mod dns;
pub mod precheck;

pub use applier::{apply, ApplyRequest};
pub use precheck::{Precheck, PrecheckMode};
