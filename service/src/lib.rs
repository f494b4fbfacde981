//! Earnzy Ledger Service
//!
//! Request/response boundary in front of the ledger: decodes tagged JSON
//! requests, dispatches them to [`earnzy_ledger::Ledger`], and encodes the
//! result or a stable error code.

pub mod config;
pub mod metrics;
pub mod protocol;
pub mod service;
pub mod state;
pub mod transport;

pub use config::ServiceConfig;
pub use protocol::{Request, RequestEnvelope, Response};
pub use service::LedgerService;
pub use transport::{serve, Frame, LineReader};
