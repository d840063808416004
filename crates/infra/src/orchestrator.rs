//! Event-driven billing orchestration.
//!
//! The orchestrator is the single consumer of billing events. It runs after
//! the triggering write has committed, guards per-member ordering with a
//! stream cursor, and reruns redistribution whenever a payment changes or an
//! invoice is canceled. Follow-up events it produces (overpayment
//! notifications) are returned to the caller for publication.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;

use cropshare_billing::{
    AdminNotifier, BillingEvent, InvoiceOverpaid, InvoiceSource, redistribute,
};
use cropshare_core::{DomainError, DomainResult, InvoiceId, MemberId, OrgContext, TenantId};
use cropshare_events::{EventEnvelope, StreamCursor, Subscription, TenantScoped};

use crate::ledger::MemberLedgerStore;

/// Consumes billing events in order and keeps every member's allocations
/// consistent with their payments.
pub struct BillingOrchestrator {
    store: Arc<dyn MemberLedgerStore>,
    notifier: Arc<dyn AdminNotifier>,
    cursors: Mutex<HashMap<(TenantId, MemberId), StreamCursor>>,
    shares: RwLock<HashMap<(TenantId, MemberId), i32>>,
}

impl BillingOrchestrator {
    pub fn new(store: Arc<dyn MemberLedgerStore>, notifier: Arc<dyn AdminNotifier>) -> Self {
        Self {
            store,
            notifier,
            cursors: Mutex::new(HashMap::new()),
            shares: RwLock::new(HashMap::new()),
        }
    }

    /// Cooperative shares currently held by a member (read model, rebuilt
    /// from processed/canceled share invoices).
    pub fn shares(&self, tenant_id: TenantId, member_id: MemberId) -> i32 {
        self.shares
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(tenant_id, member_id))
            .copied()
            .unwrap_or(0)
    }

    /// Handle one envelope from a member's billing stream, returning any
    /// follow-up events the caller must publish.
    ///
    /// Duplicate deliveries are skipped; sequence gaps and cross-stream
    /// envelopes fail before any allocation is touched.
    pub fn handle(
        &self,
        ctx: &OrgContext,
        envelope: &EventEnvelope<BillingEvent>,
    ) -> DomainResult<Vec<BillingEvent>> {
        if ctx.tenant_id() != envelope.tenant_id() {
            return Err(DomainError::invariant(
                "organization context does not match envelope tenant",
            ));
        }

        let fresh = {
            let mut cursors = self.cursors.lock().unwrap_or_else(PoisonError::into_inner);
            let cursor = cursors
                .entry((envelope.tenant_id(), envelope.member_id()))
                .or_insert_with(|| {
                    StreamCursor::start(envelope.tenant_id(), envelope.member_id())
                });
            cursor
                .admit(envelope)
                .map_err(|error| DomainError::invariant(error.to_string()))?
        };
        if !fresh {
            tracing::debug!(
                event_id = %envelope.event_id(),
                "duplicate delivery skipped"
            );
            return Ok(Vec::new());
        }

        match envelope.payload() {
            BillingEvent::InvoiceProcessed(e) => {
                if let InvoiceSource::Share { count } = e.source {
                    self.adjust_shares(e.tenant_id, e.member_id, count);
                }
            }
            BillingEvent::InvoiceCanceled(e) => {
                if let InvoiceSource::Share { count } = e.source {
                    self.adjust_shares(e.tenant_id, e.member_id, -count);
                }
            }
            _ => {}
        }

        if envelope.payload().triggers_redistribution() {
            self.redistribute_member(ctx, envelope.member_id())
        } else {
            Ok(Vec::new())
        }
    }

    /// Recompute every allocation for one member from their full payment
    /// set, commit atomically, and report invoices that newly entered
    /// overpayment. Idempotent: rerunning with no intervening writes
    /// changes nothing.
    pub fn redistribute_member(
        &self,
        ctx: &OrgContext,
        member_id: MemberId,
    ) -> DomainResult<Vec<BillingEvent>> {
        let tenant_id = ctx.tenant_id();
        let span = tracing::debug_span!("redistribute", tenant = %tenant_id, member = %member_id);
        let _guard = span.enter();

        let invoices = self.store.invoices(tenant_id, member_id);
        let payments = self.store.payments(tenant_id, member_id);
        let allocations = redistribute(&invoices, &payments, ctx)?;
        if allocations.is_empty() {
            return Ok(Vec::new());
        }

        let was_overpaid: Vec<InvoiceId> = invoices
            .iter()
            .filter(|invoice| invoice.overpaid())
            .map(|invoice| invoice.id_typed())
            .collect();

        self.store
            .commit_allocations(tenant_id, member_id, &allocations)?;
        tracing::debug!(
            invoices = allocations.len(),
            payments = payments.len(),
            "allocations committed"
        );

        let mut follow_ups = Vec::new();
        for allocation in &allocations {
            let Some(invoice) = self.store.invoice(tenant_id, member_id, allocation.invoice_id)
            else {
                continue;
            };
            if invoice.overpaid() && !was_overpaid.contains(&allocation.invoice_id) {
                self.notifier.invoice_overpaid(&invoice);
                follow_ups.push(BillingEvent::InvoiceOverpaid(InvoiceOverpaid {
                    tenant_id,
                    member_id,
                    invoice_id: allocation.invoice_id,
                    amount: invoice.amount(),
                    paid_amount: invoice.paid_amount(),
                    occurred_at: Utc::now(),
                }));
            }
        }
        Ok(follow_ups)
    }

    /// Drain every envelope already waiting on a subscription, skipping
    /// foreign tenants (worker mode; the request path calls `handle`
    /// directly and the cursor turns replays into no-ops). Returns the
    /// follow-up events produced along the way.
    pub fn run_pending(
        &self,
        ctx: &OrgContext,
        subscription: &Subscription<EventEnvelope<BillingEvent>>,
    ) -> DomainResult<Vec<BillingEvent>> {
        let mut follow_ups = Vec::new();
        while let Ok(envelope) = subscription.try_recv() {
            if TenantScoped::tenant_id(&envelope) != ctx.tenant_id() {
                continue;
            }
            follow_ups.extend(self.handle(ctx, &envelope)?);
        }
        Ok(follow_ups)
    }

    fn adjust_shares(&self, tenant_id: TenantId, member_id: MemberId, delta: i32) {
        let mut shares = self.shares.write().unwrap_or_else(PoisonError::into_inner);
        *shares.entry((tenant_id, member_id)).or_insert(0) += delta;
    }
}
