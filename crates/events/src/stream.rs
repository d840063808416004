//! Ordered consumption of per-member billing streams.
//!
//! Redistribution must run in a defined sequence per member; a cursor
//! rejects cross-stream envelopes and sequence gaps, and skips duplicates
//! so at-least-once delivery stays safe.

use thiserror::Error;

use cropshare_core::{MemberId, TenantId};

use crate::EventEnvelope;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("tenant mismatch (expected {expected}, found {found})")]
    TenantMismatch { expected: TenantId, found: TenantId },

    #[error("member mismatch (expected {expected}, found {found})")]
    MemberMismatch { expected: MemberId, found: MemberId },

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Progress marker for one member's event stream.
///
/// Sequence numbers start at 1; a gap means an envelope was lost upstream
/// and consuming past it would reorder redistribution runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamCursor {
    tenant_id: TenantId,
    member_id: MemberId,
    last_sequence_number: u64,
}

impl StreamCursor {
    pub fn start(tenant_id: TenantId, member_id: MemberId) -> Self {
        Self {
            tenant_id,
            member_id,
            last_sequence_number: 0,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }

    /// Admit the next envelope for this member stream.
    ///
    /// Returns `Ok(true)` when the envelope is fresh, `Ok(false)` for an
    /// already-seen duplicate, and an error for cross-stream envelopes or
    /// sequence gaps.
    pub fn admit<E>(&mut self, envelope: &EventEnvelope<E>) -> Result<bool, StreamError> {
        if envelope.tenant_id() != self.tenant_id {
            return Err(StreamError::TenantMismatch {
                expected: self.tenant_id,
                found: envelope.tenant_id(),
            });
        }
        if envelope.member_id() != self.member_id {
            return Err(StreamError::MemberMismatch {
                expected: self.member_id,
                found: envelope.member_id(),
            });
        }

        let found = envelope.sequence_number();
        let last = self.last_sequence_number;

        if found == 0 {
            return Err(StreamError::NonMonotonicSequence { last, found });
        }
        if found <= last {
            // Duplicate delivery; already applied.
            return Ok(false);
        }
        if found != last + 1 {
            return Err(StreamError::NonMonotonicSequence { last, found });
        }

        self.last_sequence_number = found;
        Ok(true)
    }
}
