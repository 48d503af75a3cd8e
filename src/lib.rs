pub use crate::lock_service::{AcquireResult, LockFilter, LockService, LockStats, RejectReason, ReleaseResult};
pub use crate::request::{LockFlag, LockRequest, LockType, Owner, Segment, TransactionId};
pub use crate::validator::ValidationError;

pub mod cli;
pub mod config;
pub mod conflict;
pub mod json_output;
pub mod lock_service;
pub mod lock_table;
pub mod logging;
pub mod ownership;
pub mod request;
pub mod script;
pub mod validator;
