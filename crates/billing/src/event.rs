//! Billing domain events.
//!
//! Every payment mutation and invoice cancellation is published as an event
//! and consumed by the orchestrator, which reruns redistribution for the
//! member in a defined order. `InvoiceOverpaid` is an outbound notification
//! only; it never triggers further work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cropshare_core::{Amount, InvoiceId, MemberId, PaymentId, TenantId};
use cropshare_events::Event;

use crate::source::InvoiceSource;

/// Event: a payment was recorded for a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub payment_id: PaymentId,
    pub invoice_id: Option<InvoiceId>,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a payment's amount or pre-assignment was edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUpdated {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub payment_id: PaymentId,
    pub invoice_id: Option<InvoiceId>,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a payment was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRemoved {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an invoice finished processing and entered open/closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceProcessed {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub invoice_id: InvoiceId,
    pub source: InvoiceSource,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an invoice was canceled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCanceled {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub invoice_id: InvoiceId,
    pub source: InvoiceSource,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an invoice transitioned into overpayment (notification only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceOverpaid {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub invoice_id: InvoiceId,
    pub amount: Amount,
    pub paid_amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingEvent {
    PaymentRecorded(PaymentRecorded),
    PaymentUpdated(PaymentUpdated),
    PaymentRemoved(PaymentRemoved),
    InvoiceProcessed(InvoiceProcessed),
    InvoiceCanceled(InvoiceCanceled),
    InvoiceOverpaid(InvoiceOverpaid),
}

impl BillingEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            BillingEvent::PaymentRecorded(e) => e.tenant_id,
            BillingEvent::PaymentUpdated(e) => e.tenant_id,
            BillingEvent::PaymentRemoved(e) => e.tenant_id,
            BillingEvent::InvoiceProcessed(e) => e.tenant_id,
            BillingEvent::InvoiceCanceled(e) => e.tenant_id,
            BillingEvent::InvoiceOverpaid(e) => e.tenant_id,
        }
    }

    pub fn member_id(&self) -> MemberId {
        match self {
            BillingEvent::PaymentRecorded(e) => e.member_id,
            BillingEvent::PaymentUpdated(e) => e.member_id,
            BillingEvent::PaymentRemoved(e) => e.member_id,
            BillingEvent::InvoiceProcessed(e) => e.member_id,
            BillingEvent::InvoiceCanceled(e) => e.member_id,
            BillingEvent::InvoiceOverpaid(e) => e.member_id,
        }
    }

    /// Whether the orchestrator must rerun redistribution for the member.
    pub fn triggers_redistribution(&self) -> bool {
        matches!(
            self,
            BillingEvent::PaymentRecorded(_)
                | BillingEvent::PaymentUpdated(_)
                | BillingEvent::PaymentRemoved(_)
                | BillingEvent::InvoiceCanceled(_)
        )
    }
}

impl Event for BillingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BillingEvent::PaymentRecorded(_) => "billing.payment.recorded",
            BillingEvent::PaymentUpdated(_) => "billing.payment.updated",
            BillingEvent::PaymentRemoved(_) => "billing.payment.removed",
            BillingEvent::InvoiceProcessed(_) => "billing.invoice.processed",
            BillingEvent::InvoiceCanceled(_) => "billing.invoice.canceled",
            BillingEvent::InvoiceOverpaid(_) => "billing.invoice.overpaid",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BillingEvent::PaymentRecorded(e) => e.occurred_at,
            BillingEvent::PaymentUpdated(e) => e.occurred_at,
            BillingEvent::PaymentRemoved(e) => e.occurred_at,
            BillingEvent::InvoiceProcessed(e) => e.occurred_at,
            BillingEvent::InvoiceCanceled(e) => e.occurred_at,
            BillingEvent::InvoiceOverpaid(e) => e.occurred_at,
        }
    }
}
