//! Earnzy Common Types
//!
//! Shared types used across the Earnzy coin ledger, including identifiers,
//! coin amounts, review state machines and the error taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod status;
pub mod error;
pub mod policy;

pub use identifiers::*;
pub use monetary::*;
pub use status::*;
pub use error::*;
pub use policy::*;
