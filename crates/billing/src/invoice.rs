use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use cropshare_core::{
    Amount, DomainError, DomainResult, Entity, InvoiceId, MemberId, MembershipId, OrgContext,
    TenantId,
};

use crate::ports::PdfRef;
use crate::source::InvoiceSource;

/// Invoice lifecycle states.
///
/// `Processing` is the initial, transient state while VAT is derived and the
/// PDF is attached. `Open`/`Closed` flip automatically as `paid_amount`
/// moves. `Canceled` is terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Processing,
    Open,
    Closed,
    Canceled,
}

impl InvoiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceState::Processing => "processing",
            InvoiceState::Open => "open",
            InvoiceState::Closed => "closed",
            InvoiceState::Canceled => "canceled",
        }
    }
}

impl core::fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// VAT share contained in a gross (VAT-inclusive) invoice amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatBreakdown {
    pub rate_bp: u32,
    pub amount: Amount,
}

impl VatBreakdown {
    /// Derive the VAT share contained in `gross` at `rate_bp` basis points,
    /// rounded to the cent (half away from zero on the net).
    pub fn contained_in(gross: Amount, rate_bp: u32) -> Self {
        let gross_cents = gross.cents() as i128;
        let denominator = 10_000 + rate_bp as i128;
        let numerator = gross_cents * 10_000;
        let net = if numerator >= 0 {
            (2 * numerator + denominator) / (2 * denominator)
        } else {
            (2 * numerator - denominator) / (2 * denominator)
        };
        Self {
            rate_bp,
            amount: Amount::from_cents((gross_cents - net) as i64),
        }
    }
}

/// A billing document for a fixed amount owed by a member.
///
/// `amount` is set exactly once at construction; there is no mutator.
/// `paid_amount` is only ever written through `record_allocation` (the
/// redistribution commit) or zeroed by `cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: TenantId,
    member_id: MemberId,
    date: NaiveDate,
    source: InvoiceSource,
    amount: Amount,
    paid_amount: Amount,
    state: InvoiceState,
    vat: Option<VatBreakdown>,
    pdf: Option<PdfRef>,
    sent_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn new(
        id: InvoiceId,
        tenant_id: TenantId,
        member_id: MemberId,
        date: NaiveDate,
        source: InvoiceSource,
        amount: Amount,
    ) -> DomainResult<Self> {
        if !amount.is_positive() {
            return Err(DomainError::validation("invoice amount must be positive"));
        }

        Ok(Self {
            id,
            tenant_id,
            member_id,
            date,
            source,
            amount,
            paid_amount: Amount::ZERO,
            state: InvoiceState::Processing,
            vat: None,
            pdf: None,
            sent_at: None,
            canceled_at: None,
        })
    }

    /// Membership invoice; the member-facing price is cash-rounded to five
    /// cents.
    pub fn membership(
        id: InvoiceId,
        tenant_id: TenantId,
        member_id: MemberId,
        date: NaiveDate,
        membership_id: MembershipId,
        price: Amount,
    ) -> DomainResult<Self> {
        Self::new(
            id,
            tenant_id,
            member_id,
            date,
            InvoiceSource::Membership { membership_id },
            price.round_to_five_cents(),
        )
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn source(&self) -> &InvoiceSource {
        &self.source
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn paid_amount(&self) -> Amount {
        self.paid_amount
    }

    pub fn state(&self) -> InvoiceState {
        self.state
    }

    pub fn vat(&self) -> Option<VatBreakdown> {
        self.vat
    }

    pub fn pdf(&self) -> Option<&PdfRef> {
        self.pdf.as_ref()
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn canceled_at(&self) -> Option<DateTime<Utc>> {
        self.canceled_at
    }

    /// Outstanding balance: `max(amount - paid_amount, 0)`.
    pub fn missing_amount(&self) -> Amount {
        (self.amount - self.paid_amount).max(Amount::ZERO)
    }

    /// Overpayment is a legal condition: it is surfaced to admins but never
    /// blocks an invoice operation.
    pub fn overpaid(&self) -> bool {
        self.state != InvoiceState::Canceled && self.paid_amount > self.amount
    }

    /// Whether redistribution may allocate onto this invoice. Processing
    /// invoices stay out until they leave processing; canceled invoices
    /// stay out for good.
    pub fn allocatable(&self) -> bool {
        matches!(self.state, InvoiceState::Open | InvoiceState::Closed)
    }

    /// Derive the VAT contained in the (VAT-inclusive) amount, if the tenant
    /// is VAT-registered. Part of processing; idempotent.
    pub fn derive_vat(&mut self, ctx: &OrgContext) -> DomainResult<()> {
        self.ensure_processing("derive vat")?;
        self.vat = ctx
            .vat_rate_bp()
            .map(|rate_bp| VatBreakdown::contained_in(self.amount, rate_bp));
        Ok(())
    }

    /// Attach the rendered document. Re-attaching on a retried processing
    /// run replaces the previous reference.
    pub fn attach_pdf(&mut self, pdf: PdfRef) -> DomainResult<()> {
        self.ensure_processing("attach document")?;
        self.pdf = Some(pdf);
        Ok(())
    }

    /// Leave `processing`, landing on `open` or `closed` depending on the
    /// outstanding balance.
    pub fn finish_processing(&mut self) -> DomainResult<()> {
        self.ensure_processing("finish processing")?;
        self.state = InvoiceState::Open;
        self.reconcile_state();
        Ok(())
    }

    /// Write the allocation computed by redistribution and reconcile
    /// `open`/`closed`. Only the redistribution commit calls this.
    pub fn record_allocation(&mut self, paid_amount: Amount) -> DomainResult<()> {
        if !self.allocatable() {
            return Err(DomainError::invariant(format!(
                "allocation written to {} invoice {}",
                self.state, self.id
            )));
        }
        self.paid_amount = paid_amount;
        self.reconcile_state();
        Ok(())
    }

    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        match self.state {
            InvoiceState::Processing | InvoiceState::Canceled => {
                return Err(DomainError::invalid_transition(self.state.as_str(), "send"));
            }
            InvoiceState::Open | InvoiceState::Closed => {}
        }
        if self.sent_at.is_some() {
            return Err(DomainError::conflict("invoice already sent"));
        }
        self.sent_at = Some(at);
        Ok(())
    }

    /// Cancellation policy: never from `processing` or `canceled`, and
    /// otherwise only if the invoice is open, dated in the current fiscal
    /// year, or manually sourced.
    pub fn can_cancel(&self, ctx: &OrgContext) -> bool {
        match self.state {
            InvoiceState::Processing | InvoiceState::Canceled => false,
            InvoiceState::Open => true,
            InvoiceState::Closed => {
                ctx.current_fiscal_year().contains(self.date)
                    || matches!(self.source, InvoiceSource::Other { .. })
            }
        }
    }

    /// Cancel the invoice, zeroing its allocation. The member's payments
    /// must be redistributed afterwards so the money reflows onto their
    /// remaining invoices.
    pub fn cancel(&mut self, at: DateTime<Utc>, ctx: &OrgContext) -> DomainResult<()> {
        if !self.can_cancel(ctx) {
            return Err(DomainError::invalid_transition(
                self.state.as_str(),
                "cancel",
            ));
        }
        self.state = InvoiceState::Canceled;
        self.canceled_at = Some(at);
        self.paid_amount = Amount::ZERO;
        Ok(())
    }

    /// Hard deletion is only allowed before the invoice was sent, before any
    /// payment references it, and never mid-processing.
    pub fn can_destroy(&self, has_payments: bool) -> bool {
        self.sent_at.is_none() && !has_payments && self.state != InvoiceState::Processing
    }

    fn ensure_processing(&self, operation: &str) -> DomainResult<()> {
        if self.state != InvoiceState::Processing {
            return Err(DomainError::invalid_transition(
                self.state.as_str(),
                operation,
            ));
        }
        Ok(())
    }

    fn reconcile_state(&mut self) {
        if matches!(self.state, InvoiceState::Open | InvoiceState::Closed) {
            self.state = if self.missing_amount().is_zero() {
                InvoiceState::Closed
            } else {
                InvoiceState::Open
            };
        }
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &InvoiceId {
        &self.id
    }
}
