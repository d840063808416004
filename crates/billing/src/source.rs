//! What an invoice bills.

use serde::{Deserialize, Serialize};

use cropshare_core::{ActivityParticipationId, MembershipId, ShopOrderId};

/// The billable target behind an invoice.
///
/// Each variant carries a typed reference to exactly one target; there is
/// no loosely-typed (type, id) pair to mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvoiceSource {
    /// A basket subscription for one fiscal year.
    Membership { membership_id: MembershipId },
    /// A missed half-day work participation billed to the member.
    ActivityParticipation {
        participation_id: ActivityParticipationId,
    },
    /// Cooperative share certificates; canceling the invoice releases them.
    Share { count: i32 },
    /// A shop order.
    ShopOrder { order_id: ShopOrderId },
    /// The yearly support/membership fee.
    AnnualFee,
    /// Free-form manual billing.
    Other { memo: String },
}

impl InvoiceSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            InvoiceSource::Membership { .. } => SourceKind::Membership,
            InvoiceSource::ActivityParticipation { .. } => SourceKind::ActivityParticipation,
            InvoiceSource::Share { .. } => SourceKind::Share,
            InvoiceSource::ShopOrder { .. } => SourceKind::ShopOrder,
            InvoiceSource::AnnualFee => SourceKind::AnnualFee,
            InvoiceSource::Other { .. } => SourceKind::Other,
        }
    }
}

/// Field-less discriminant; the allocation ordering compares these.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Membership,
    ActivityParticipation,
    Share,
    ShopOrder,
    AnnualFee,
    Other,
}
