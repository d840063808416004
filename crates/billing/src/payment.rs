use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use cropshare_core::{
    Amount, DomainError, DomainResult, Entity, InvoiceId, MemberId, PaymentId, TenantId,
};

/// A signed monetary transaction from a member.
///
/// A payment may be pre-assigned to one invoice or left floating, in which
/// case redistribution allocates it in creation order. Negative amounts are
/// refunds/paybacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    tenant_id: TenantId,
    member_id: MemberId,
    invoice_id: Option<InvoiceId>,
    amount: Amount,
    date: NaiveDate,
    created_at: DateTime<Utc>,
    fingerprint: Option<String>,
}

impl Payment {
    pub fn new(
        id: PaymentId,
        tenant_id: TenantId,
        member_id: MemberId,
        invoice_id: Option<InvoiceId>,
        amount: Amount,
        date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if amount.is_zero() {
            return Err(DomainError::validation("payment amount must be nonzero"));
        }

        Ok(Self {
            id,
            tenant_id,
            member_id,
            invoice_id,
            amount,
            date,
            created_at,
            fingerprint: None,
        })
    }

    /// External dedup key for reconciled bank payments; the ledger store
    /// enforces uniqueness per tenant.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Not pre-assigned to any invoice.
    pub fn is_floating(&self) -> bool {
        self.invoice_id.is_none()
    }

    /// Admin edit: retarget or release the pre-assignment.
    pub fn reassign(&mut self, invoice_id: Option<InvoiceId>) {
        self.invoice_id = invoice_id;
    }

    /// Admin edit: correct the amount. The same nonzero rule applies as at
    /// creation.
    pub fn set_amount(&mut self, amount: Amount) -> DomainResult<()> {
        if amount.is_zero() {
            return Err(DomainError::validation("payment amount must be nonzero"));
        }
        self.amount = amount;
        Ok(())
    }
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &PaymentId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn zero_amounts_are_rejected() {
        let err = Payment::new(
            PaymentId::new(),
            TenantId::new(),
            MemberId::new(),
            None,
            Amount::ZERO,
            date(2026, 6, 1),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn refunds_are_valid_payments() {
        let payment = Payment::new(
            PaymentId::new(),
            TenantId::new(),
            MemberId::new(),
            None,
            Amount::new(-25, 0),
            date(2026, 6, 1),
            Utc::now(),
        )
        .unwrap();
        assert!(payment.is_floating());
        assert!(payment.amount().is_negative());
    }

    #[test]
    fn amount_corrections_stay_nonzero() {
        let mut payment = Payment::new(
            PaymentId::new(),
            TenantId::new(),
            MemberId::new(),
            None,
            Amount::new(25, 0),
            date(2026, 6, 1),
            Utc::now(),
        )
        .unwrap();

        payment.set_amount(Amount::new(20, 0)).unwrap();
        assert_eq!(payment.amount(), Amount::new(20, 0));
        assert!(payment.set_amount(Amount::ZERO).is_err());
    }

    #[test]
    fn fingerprint_is_carried() {
        let payment = Payment::new(
            PaymentId::new(),
            TenantId::new(),
            MemberId::new(),
            None,
            Amount::new(25, 0),
            date(2026, 6, 1),
            Utc::now(),
        )
        .unwrap()
        .with_fingerprint("camt:2026-06-01:0001");
        assert_eq!(payment.fingerprint(), Some("camt:2026-06-01:0001"));
    }
}
