use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cropshare_core::{MemberId, TenantId};

/// Envelope for an event, carrying multi-tenant + stream metadata.
///
/// Billing events form **per-member streams**: a member is the unit of
/// payment redistribution, so ordering only needs to hold within one
/// member's envelopes. `sequence_number` is monotonically increasing per
/// member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,
    member_id: MemberId,

    /// Monotonically increasing position in the member's stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        tenant_id: TenantId,
        member_id: MemberId,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            tenant_id,
            member_id,
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
