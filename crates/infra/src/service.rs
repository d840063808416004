//! Invoice lifecycle service: the trigger interface of the billing core.
//!
//! Every mutation is store-first, publish-second: the ledger commit is the
//! durable fact, the event fan-out is the follow-up unit of work. The
//! orchestrator is invoked synchronously after each publication, so
//! redistribution always runs in the order mutations committed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use cropshare_billing::{
    AdminNotifier, BillingEvent, Invoice, InvoiceCanceled, InvoiceMailer, InvoiceProcessed,
    InvoiceRenderer, InvoiceState, Payment, PaymentRecorded, PaymentRemoved, PaymentUpdated,
};
use cropshare_core::{
    DomainError, DomainResult, InvoiceId, MemberId, OrgContext, PaymentId, TenantId,
};
use cropshare_events::{EventBus, EventEnvelope};

use crate::ledger::MemberLedgerStore;
use crate::orchestrator::BillingOrchestrator;

pub struct InvoiceService<B>
where
    B: EventBus<EventEnvelope<BillingEvent>>,
{
    store: Arc<dyn MemberLedgerStore>,
    bus: B,
    renderer: Arc<dyn InvoiceRenderer>,
    mailer: Arc<dyn InvoiceMailer>,
    notifier: Arc<dyn AdminNotifier>,
    orchestrator: Arc<BillingOrchestrator>,
    sequences: Mutex<HashMap<(TenantId, MemberId), u64>>,
}

impl<B> InvoiceService<B>
where
    B: EventBus<EventEnvelope<BillingEvent>>,
{
    pub fn new(
        store: Arc<dyn MemberLedgerStore>,
        bus: B,
        renderer: Arc<dyn InvoiceRenderer>,
        mailer: Arc<dyn InvoiceMailer>,
        notifier: Arc<dyn AdminNotifier>,
        orchestrator: Arc<BillingOrchestrator>,
    ) -> Self {
        Self {
            store,
            bus,
            renderer,
            mailer,
            notifier,
            orchestrator,
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Register a freshly built invoice. It stays in `processing` (and out
    /// of redistribution) until `process` runs.
    pub fn create_invoice(&self, ctx: &OrgContext, invoice: Invoice) -> DomainResult<()> {
        ensure_tenant(ctx, invoice.tenant_id())?;
        self.store.upsert_invoice(ctx.tenant_id(), invoice);
        Ok(())
    }

    pub fn record_payment(&self, ctx: &OrgContext, payment: Payment) -> DomainResult<()> {
        ensure_tenant(ctx, payment.tenant_id())?;
        let event = PaymentRecorded {
            tenant_id: payment.tenant_id(),
            member_id: payment.member_id(),
            payment_id: payment.id_typed(),
            invoice_id: payment.invoice_id(),
            amount: payment.amount(),
            occurred_at: Utc::now(),
        };
        self.store.insert_payment(ctx.tenant_id(), payment)?;
        self.dispatch(ctx, BillingEvent::PaymentRecorded(event))
    }

    pub fn update_payment(&self, ctx: &OrgContext, payment: Payment) -> DomainResult<()> {
        ensure_tenant(ctx, payment.tenant_id())?;
        let event = PaymentUpdated {
            tenant_id: payment.tenant_id(),
            member_id: payment.member_id(),
            payment_id: payment.id_typed(),
            invoice_id: payment.invoice_id(),
            amount: payment.amount(),
            occurred_at: Utc::now(),
        };
        self.store.update_payment(ctx.tenant_id(), payment)?;
        self.dispatch(ctx, BillingEvent::PaymentUpdated(event))
    }

    pub fn remove_payment(
        &self,
        ctx: &OrgContext,
        member_id: MemberId,
        payment_id: PaymentId,
    ) -> DomainResult<()> {
        let removed = self
            .store
            .remove_payment(ctx.tenant_id(), member_id, payment_id)?;
        self.dispatch(
            ctx,
            BillingEvent::PaymentRemoved(PaymentRemoved {
                tenant_id: removed.tenant_id(),
                member_id: removed.member_id(),
                payment_id: removed.id_typed(),
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Finish setting up a `processing` invoice: redistribute, derive VAT,
    /// attach the rendered document, redistribute again (the invoice is now
    /// allocatable and pulls in any floating credit), and settle on
    /// open/closed.
    ///
    /// Safe to rerun after a partial failure: every step is idempotent and
    /// the invoice only leaves `processing` at the end.
    pub fn process(
        &self,
        ctx: &OrgContext,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        let mut invoice = self.load_invoice(ctx, member_id, invoice_id)?;
        if invoice.state() != InvoiceState::Processing {
            return Err(DomainError::invalid_transition(
                invoice.state().as_str(),
                "process",
            ));
        }

        self.run_redistribution(ctx, member_id)?;

        invoice.derive_vat(ctx)?;
        match self.renderer.render(&invoice) {
            Ok(pdf) => invoice.attach_pdf(pdf)?,
            Err(error) => {
                // Rendering is best-effort: the financial state still
                // settles, and the document is produced on a later rerun.
                tracing::error!(%invoice_id, %error, "invoice rendering failed");
                self.notifier.delivery_failed(&invoice, &error.to_string());
            }
        }

        invoice.finish_processing()?;
        let source = invoice.source().clone();
        self.store.upsert_invoice(ctx.tenant_id(), invoice);

        self.run_redistribution(ctx, member_id)?;

        self.dispatch(
            ctx,
            BillingEvent::InvoiceProcessed(InvoiceProcessed {
                tenant_id: ctx.tenant_id(),
                member_id,
                invoice_id,
                source,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Send the invoice to the member. Delivery is best-effort: a mail
    /// failure is reported and suppressed, never unwinding `sent_at`.
    pub fn send(
        &self,
        ctx: &OrgContext,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        let mut invoice = self.load_invoice(ctx, member_id, invoice_id)?;
        invoice.mark_sent(Utc::now())?;
        self.store.upsert_invoice(ctx.tenant_id(), invoice.clone());

        if let Err(error) = self.mailer.deliver(&invoice) {
            tracing::error!(%invoice_id, %error, "invoice delivery failed");
            self.notifier.delivery_failed(&invoice, &error.to_string());
        }
        Ok(())
    }

    /// Cancel the invoice and reflow its payments onto the member's other
    /// invoices.
    pub fn cancel(
        &self,
        ctx: &OrgContext,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        let mut invoice = self.load_invoice(ctx, member_id, invoice_id)?;
        invoice.cancel(Utc::now(), ctx)?;
        let source = invoice.source().clone();
        self.store.upsert_invoice(ctx.tenant_id(), invoice);

        self.dispatch(
            ctx,
            BillingEvent::InvoiceCanceled(InvoiceCanceled {
                tenant_id: ctx.tenant_id(),
                member_id,
                invoice_id,
                source,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Hard-delete when still possible, otherwise cancel, otherwise fail.
    pub fn destroy_or_cancel(
        &self,
        ctx: &OrgContext,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        let invoice = self.load_invoice(ctx, member_id, invoice_id)?;
        let has_payments = self
            .store
            .payments_for_invoice(ctx.tenant_id(), member_id, invoice_id)
            > 0;

        if invoice.can_destroy(has_payments) {
            self.store
                .remove_invoice(ctx.tenant_id(), member_id, invoice_id)?;
            // Floating credit the invoice was absorbing reflows onto the
            // member's remaining invoices.
            return self.run_redistribution(ctx, member_id);
        }
        if invoice.can_cancel(ctx) {
            return self.cancel(ctx, member_id, invoice_id);
        }
        Err(DomainError::invalid_transition(
            invoice.state().as_str(),
            "destroy",
        ))
    }

    /// Manual redistribution trigger (admin repair, backfills).
    pub fn redistribute(&self, ctx: &OrgContext, member_id: MemberId) -> DomainResult<()> {
        self.run_redistribution(ctx, member_id)
    }

    fn run_redistribution(&self, ctx: &OrgContext, member_id: MemberId) -> DomainResult<()> {
        for follow_up in self.orchestrator.redistribute_member(ctx, member_id)? {
            self.dispatch(ctx, follow_up)?;
        }
        Ok(())
    }

    fn dispatch(&self, ctx: &OrgContext, event: BillingEvent) -> DomainResult<()> {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let member_id = event.member_id();
            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                ctx.tenant_id(),
                member_id,
                self.next_sequence(ctx.tenant_id(), member_id),
                event,
            );

            // The ledger already holds the fact; publication is fan-out
            // only, so a bus failure is logged and retried by replay.
            if let Err(error) = self.bus.publish(envelope.clone()) {
                tracing::warn!(?error, "event publication failed");
            }

            queue.extend(self.orchestrator.handle(ctx, &envelope)?);
        }
        Ok(())
    }

    fn load_invoice(
        &self,
        ctx: &OrgContext,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> DomainResult<Invoice> {
        self.store
            .invoice(ctx.tenant_id(), member_id, invoice_id)
            .ok_or(DomainError::NotFound)
    }

    fn next_sequence(&self, tenant_id: TenantId, member_id: MemberId) -> u64 {
        let mut sequences = self.sequences.lock().unwrap_or_else(PoisonError::into_inner);
        let next = sequences.entry((tenant_id, member_id)).or_insert(0);
        *next += 1;
        *next
    }
}

fn ensure_tenant(ctx: &OrgContext, tenant_id: TenantId) -> DomainResult<()> {
    if ctx.tenant_id() != tenant_id {
        return Err(DomainError::invariant("tenant mismatch"));
    }
    Ok(())
}
