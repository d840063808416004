//! Tenant-isolated storage for member billing ledgers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cropshare_billing::{Invoice, InvoiceAllocation, Payment};
use cropshare_core::{DomainError, DomainResult, InvoiceId, MemberId, PaymentId, TenantId};

/// Storage seam for member billing state.
///
/// One member's invoices and payments form a single consistency unit:
/// `commit_allocations` applies a full redistribution result atomically, and
/// implementations must serialize concurrent commits for the same member.
/// Different members are fully independent.
pub trait MemberLedgerStore: Send + Sync {
    fn invoices(&self, tenant_id: TenantId, member_id: MemberId) -> Vec<Invoice>;

    fn payments(&self, tenant_id: TenantId, member_id: MemberId) -> Vec<Payment>;

    fn invoice(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> Option<Invoice>;

    fn upsert_invoice(&self, tenant_id: TenantId, invoice: Invoice);

    fn remove_invoice(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()>;

    /// Insert a payment. A duplicate fingerprint within the tenant is a
    /// conflict (bank reconciliation replays the same file safely).
    fn insert_payment(&self, tenant_id: TenantId, payment: Payment) -> DomainResult<()>;

    fn update_payment(&self, tenant_id: TenantId, payment: Payment) -> DomainResult<()>;

    fn remove_payment(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        payment_id: PaymentId,
    ) -> DomainResult<Payment>;

    /// How many payments are pre-assigned to an invoice (destroy guard).
    fn payments_for_invoice(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> usize;

    /// Apply a full redistribution result for one member atomically: either
    /// every allocation commits, or none do.
    fn commit_allocations(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        allocations: &[InvoiceAllocation],
    ) -> DomainResult<()>;
}

impl<S> MemberLedgerStore for Arc<S>
where
    S: MemberLedgerStore + ?Sized,
{
    fn invoices(&self, tenant_id: TenantId, member_id: MemberId) -> Vec<Invoice> {
        (**self).invoices(tenant_id, member_id)
    }

    fn payments(&self, tenant_id: TenantId, member_id: MemberId) -> Vec<Payment> {
        (**self).payments(tenant_id, member_id)
    }

    fn invoice(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> Option<Invoice> {
        (**self).invoice(tenant_id, member_id, invoice_id)
    }

    fn upsert_invoice(&self, tenant_id: TenantId, invoice: Invoice) {
        (**self).upsert_invoice(tenant_id, invoice)
    }

    fn remove_invoice(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        (**self).remove_invoice(tenant_id, member_id, invoice_id)
    }

    fn insert_payment(&self, tenant_id: TenantId, payment: Payment) -> DomainResult<()> {
        (**self).insert_payment(tenant_id, payment)
    }

    fn update_payment(&self, tenant_id: TenantId, payment: Payment) -> DomainResult<()> {
        (**self).update_payment(tenant_id, payment)
    }

    fn remove_payment(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        payment_id: PaymentId,
    ) -> DomainResult<Payment> {
        (**self).remove_payment(tenant_id, member_id, payment_id)
    }

    fn payments_for_invoice(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> usize {
        (**self).payments_for_invoice(tenant_id, member_id, invoice_id)
    }

    fn commit_allocations(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        allocations: &[InvoiceAllocation],
    ) -> DomainResult<()> {
        (**self).commit_allocations(tenant_id, member_id, allocations)
    }
}

#[derive(Debug, Default)]
struct MemberAccount {
    invoices: HashMap<InvoiceId, Invoice>,
    payments: HashMap<PaymentId, Payment>,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<(TenantId, MemberId), MemberAccount>,
    fingerprints: HashSet<(TenantId, String)>,
}

/// In-memory ledger for tests/dev.
///
/// The single write lock per mutation stands in for the row-lock
/// serialization a relational store provides: no two commits for the same
/// member interleave.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    inner: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemberLedgerStore for InMemoryLedger {
    fn invoices(&self, tenant_id: TenantId, member_id: MemberId) -> Vec<Invoice> {
        let state = self.read();
        let mut invoices: Vec<Invoice> = state
            .accounts
            .get(&(tenant_id, member_id))
            .map(|account| account.invoices.values().cloned().collect())
            .unwrap_or_default();
        invoices.sort_by_key(|invoice| (invoice.date(), invoice.id_typed()));
        invoices
    }

    fn payments(&self, tenant_id: TenantId, member_id: MemberId) -> Vec<Payment> {
        let state = self.read();
        let mut payments: Vec<Payment> = state
            .accounts
            .get(&(tenant_id, member_id))
            .map(|account| account.payments.values().cloned().collect())
            .unwrap_or_default();
        payments.sort_by_key(|payment| (payment.created_at(), payment.id_typed()));
        payments
    }

    fn invoice(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> Option<Invoice> {
        let state = self.read();
        state
            .accounts
            .get(&(tenant_id, member_id))
            .and_then(|account| account.invoices.get(&invoice_id).cloned())
    }

    fn upsert_invoice(&self, tenant_id: TenantId, invoice: Invoice) {
        let mut state = self.write();
        state
            .accounts
            .entry((tenant_id, invoice.member_id()))
            .or_default()
            .invoices
            .insert(invoice.id_typed(), invoice);
    }

    fn remove_invoice(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        let mut state = self.write();
        state
            .accounts
            .get_mut(&(tenant_id, member_id))
            .and_then(|account| account.invoices.remove(&invoice_id))
            .map(|_| ())
            .ok_or(DomainError::NotFound)
    }

    fn insert_payment(&self, tenant_id: TenantId, payment: Payment) -> DomainResult<()> {
        let mut state = self.write();
        if let Some(fingerprint) = payment.fingerprint() {
            let key = (tenant_id, fingerprint.to_string());
            if state.fingerprints.contains(&key) {
                return Err(DomainError::conflict(format!(
                    "payment fingerprint {fingerprint} already recorded"
                )));
            }
            state.fingerprints.insert(key);
        }
        state
            .accounts
            .entry((tenant_id, payment.member_id()))
            .or_default()
            .payments
            .insert(payment.id_typed(), payment);
        Ok(())
    }

    fn update_payment(&self, tenant_id: TenantId, payment: Payment) -> DomainResult<()> {
        let mut state = self.write();
        let account = state
            .accounts
            .get_mut(&(tenant_id, payment.member_id()))
            .ok_or(DomainError::NotFound)?;
        if !account.payments.contains_key(&payment.id_typed()) {
            return Err(DomainError::NotFound);
        }
        account.payments.insert(payment.id_typed(), payment);
        Ok(())
    }

    fn remove_payment(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        payment_id: PaymentId,
    ) -> DomainResult<Payment> {
        let mut state = self.write();
        let removed = state
            .accounts
            .get_mut(&(tenant_id, member_id))
            .and_then(|account| account.payments.remove(&payment_id))
            .ok_or(DomainError::NotFound)?;
        if let Some(fingerprint) = removed.fingerprint() {
            state
                .fingerprints
                .remove(&(tenant_id, fingerprint.to_string()));
        }
        Ok(removed)
    }

    fn payments_for_invoice(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        invoice_id: InvoiceId,
    ) -> usize {
        let state = self.read();
        state
            .accounts
            .get(&(tenant_id, member_id))
            .map(|account| {
                account
                    .payments
                    .values()
                    .filter(|payment| payment.invoice_id() == Some(invoice_id))
                    .count()
            })
            .unwrap_or(0)
    }

    fn commit_allocations(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        allocations: &[InvoiceAllocation],
    ) -> DomainResult<()> {
        let mut state = self.write();
        let account = state
            .accounts
            .get_mut(&(tenant_id, member_id))
            .ok_or(DomainError::NotFound)?;

        // Validate the full set first so a bad allocation leaves the ledger
        // untouched.
        for allocation in allocations {
            let invoice = account
                .invoices
                .get(&allocation.invoice_id)
                .ok_or(DomainError::NotFound)?;
            if !invoice.allocatable() {
                return Err(DomainError::invariant(format!(
                    "allocation targets {} invoice {}",
                    invoice.state(),
                    allocation.invoice_id
                )));
            }
        }

        for allocation in allocations {
            if let Some(invoice) = account.invoices.get_mut(&allocation.invoice_id) {
                invoice.record_allocation(allocation.paid_amount)?;
            }
        }
        Ok(())
    }
}
