use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction handle issued for every granted batch
pub type TransactionId = u32;

/// Lock type requested by a console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockType {
    Read,      // Shared lock
    Write,     // Exclusive lock
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockType::Read => write!(f, "Read"),
            LockType::Write => write!(f, "Write"),
        }
    }
}

/// Per-segment lock flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockFlag {
    /// Conflict with any request using the same segment length at this level
    LockSame,
    /// Conflict with any request at this level regardless of path
    LockAll,
    /// Resolve by comparing resource id bytes
    DontLock,
}

impl LockFlag {
    /// True for the two flags that are limited to one per request
    pub fn is_locking(self) -> bool {
        matches!(self, LockFlag::LockSame | LockFlag::LockAll)
    }
}

impl fmt::Display for LockFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockFlag::LockSame => write!(f, "LockSame"),
            LockFlag::LockAll => write!(f, "LockAll"),
            LockFlag::DontLock => write!(f, "DontLock"),
        }
    }
}

/// One level of the resource path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "LockFlag")]
    pub flag: LockFlag,
    /// Byte count of the resource id attributed to this level
    #[serde(rename = "SegmentLength")]
    pub length: u32,
}

impl Segment {
    pub fn new(flag: LockFlag, length: u32) -> Self {
        Segment { flag, length }
    }
}

/// Identity of the console session that owns a lock
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    #[serde(rename = "SessionID")]
    pub session_id: String,
    #[serde(rename = "HMCID")]
    pub console_id: String,
}

impl Owner {
    pub fn new(session_id: impl Into<String>, console_id: impl Into<String>) -> Self {
        Owner {
            session_id: session_id.into(),
            console_id: console_id.into(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.console_id, self.session_id)
    }
}

/// A single lock request as submitted by a management console
///
/// Field names on the wire follow the console lock protocol
/// (`SessionID`, `HMCID`, `LockType`, `ResourceID`, `SegmentFlags`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockRequest {
    #[serde(rename = "SessionID")]
    pub session_id: String,
    #[serde(rename = "HMCID")]
    pub console_id: String,
    #[serde(rename = "LockType")]
    pub lock_type: LockType,
    #[serde(rename = "ResourceID")]
    pub resource_id: u64,
    /// Most-significant segment first
    #[serde(rename = "SegmentFlags")]
    pub segments: Vec<Segment>,
}

impl LockRequest {
    pub fn new(
        owner: &Owner,
        lock_type: LockType,
        resource_id: u64,
        segments: Vec<Segment>,
    ) -> Self {
        LockRequest {
            session_id: owner.session_id.clone(),
            console_id: owner.console_id.clone(),
            lock_type,
            resource_id,
            segments,
        }
    }

    pub fn owner(&self) -> Owner {
        Owner::new(self.session_id.clone(), self.console_id.clone())
    }

    pub fn is_owned_by(&self, owner: &Owner) -> bool {
        self.session_id == owner.session_id && self.console_id == owner.console_id
    }
}
