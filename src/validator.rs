use thiserror::Error;

use crate::request::LockRequest;

pub const MIN_SEGMENTS: usize = 2;
pub const MAX_SEGMENTS: usize = 6;
pub const MIN_SEGMENT_LENGTH: u32 = 1;
pub const MAX_SEGMENT_LENGTH: u32 = 4;

/// Reason a lock request (or batch) was refused before touching the table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("lock request batch is empty")]
    EmptyBatch,

    #[error("batch of {size} requests exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("segment count {0} outside 2..=6")]
    SegmentCount(usize),

    #[error("segment {index} has length {length}, expected 1..=4")]
    SegmentLength { index: usize, length: u32 },

    #[error("more than one LockSame/LockAll segment")]
    MultipleLockFlags,

    #[error("requests in one batch belong to different console sessions")]
    MixedOwners,

    /// Request could not be decoded, e.g. an unknown lock type or flag literal
    #[error("malformed lock request: {0}")]
    Malformed(String),
}

/// Validate a single lock request
///
/// Lock type and flag literals are closed enums, so only the structural
/// checks remain: segment count, then each segment length, then the number
/// of LockSame/LockAll segments. The first failure is returned.
pub fn validate(request: &LockRequest) -> Result<(), ValidationError> {
    let count = request.segments.len();
    if !(MIN_SEGMENTS..=MAX_SEGMENTS).contains(&count) {
        log::debug!("Invalid segment count {} from {}", count, request.owner());
        return Err(ValidationError::SegmentCount(count));
    }

    let mut locking = 0;
    for (index, segment) in request.segments.iter().enumerate() {
        if !(MIN_SEGMENT_LENGTH..=MAX_SEGMENT_LENGTH).contains(&segment.length) {
            log::debug!("Invalid length {} for segment {}", segment.length, index);
            return Err(ValidationError::SegmentLength {
                index,
                length: segment.length,
            });
        }

        if segment.flag.is_locking() {
            locking += 1;
            if locking > 1 {
                return Err(ValidationError::MultipleLockFlags);
            }
        }
    }

    Ok(())
}

pub fn is_valid(request: &LockRequest) -> bool {
    validate(request).is_ok()
}

/// Validate a whole batch; `max_batch_size` of 0 means unlimited
pub fn validate_batch(requests: &[LockRequest], max_batch_size: usize) -> Result<(), ValidationError> {
    if requests.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    if max_batch_size > 0 && requests.len() > max_batch_size {
        return Err(ValidationError::BatchTooLarge {
            size: requests.len(),
            max: max_batch_size,
        });
    }

    requests.iter().try_for_each(validate)?;

    // a transaction has exactly one owner, fixed at grant time
    let owner = &requests[0];
    if requests[1..]
        .iter()
        .any(|r| r.session_id != owner.session_id || r.console_id != owner.console_id)
    {
        log::debug!("Lock batch mixes owners, first is {}", owner.owner());
        return Err(ValidationError::MixedOwners);
    }

    Ok(())
}
