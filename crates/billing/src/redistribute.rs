//! Deterministic reallocation of a member's payments across their invoices.
//!
//! Pure function over in-memory snapshots: no store access, no side
//! effects, so the allocation order is unit-testable in isolation. The
//! caller (the orchestrator) commits the returned allocations atomically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use cropshare_core::{Amount, DomainError, DomainResult, FiscalYear, InvoiceId, OrgContext};

use crate::invoice::{Invoice, InvoiceState};
use crate::payment::Payment;
use crate::source::SourceKind;

/// Redistribution result for one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAllocation {
    pub invoice_id: InvoiceId,
    pub paid_amount: Amount,
    pub state: InvoiceState,
}

struct Slot<'a> {
    invoice: &'a Invoice,
    fiscal_year: FiscalYear,
    allocated: i128,
    /// Contribution from payments pre-assigned to this invoice. Floating
    /// drains stop here.
    floor: i128,
}

impl Slot<'_> {
    fn amount(&self) -> i128 {
        self.invoice.amount().cents() as i128
    }

    fn room(&self) -> i128 {
        self.amount() - self.allocated
    }

    fn preference_key(&self) -> (SourceKind, FiscalYear) {
        (self.invoice.source().kind(), self.fiscal_year)
    }
}

/// Reallocate all of `payments` across the allocatable `invoices`.
///
/// Allocatable means open or closed: processing invoices stay out until
/// they finish processing, canceled invoices stay out for good. Payments
/// pre-assigned to a non-allocatable invoice are treated as floating, which
/// is what reflows money off a canceled invoice.
///
/// Floating payments apply in ascending creation order. A positive payment
/// fills invoices toward their amount, preferring the source kind of the
/// most recently allocated invoice within the same fiscal year, then
/// ascending date, then ascending id. Any surplus past the last open
/// invoice lands on the last invoice in order, so overpayment always shows
/// on the most recent invoice. A negative payment drains from the earliest
/// invoice, never below a pre-assigned floor.
///
/// The result always balances: the sum of allocations equals the sum of the
/// member's payments to the cent, or the function fails with an invariant
/// violation.
pub fn redistribute(
    invoices: &[Invoice],
    payments: &[Payment],
    ctx: &OrgContext,
) -> DomainResult<Vec<InvoiceAllocation>> {
    let mut slots: Vec<Slot<'_>> = invoices
        .iter()
        .filter(|invoice| invoice.allocatable())
        .map(|invoice| Slot {
            invoice,
            fiscal_year: ctx.fiscal_year_of(invoice.date()),
            allocated: 0,
            floor: 0,
        })
        .collect();

    if slots.is_empty() {
        // Nothing to allocate onto; the member carries credit until an
        // invoice leaves processing.
        return Ok(Vec::new());
    }

    // Base order: ascending date, then ascending id.
    slots.sort_by_key(|slot| (slot.invoice.date(), slot.invoice.id_typed()));

    let index_of: HashMap<InvoiceId, usize> = slots
        .iter()
        .enumerate()
        .map(|(ix, slot)| (slot.invoice.id_typed(), ix))
        .collect();

    // First pass: honor pre-assignment. This may push an invoice above its
    // amount or below zero; floors record what pre-assignment contributed.
    let mut floating: Vec<&Payment> = Vec::new();
    for payment in payments {
        match payment.invoice_id().and_then(|id| index_of.get(&id)) {
            Some(&ix) => slots[ix].allocated += payment.amount().cents() as i128,
            None => floating.push(payment),
        }
    }
    for slot in &mut slots {
        slot.floor = slot.allocated;
    }

    // Second pass: floating payments in creation order.
    floating.sort_by_key(|payment| (payment.created_at(), payment.id_typed()));

    let mut current: Option<(SourceKind, FiscalYear)> = None;
    for payment in floating {
        let amount = payment.amount().cents() as i128;
        if amount > 0 {
            current = fill(&mut slots, amount, current);
        } else {
            drain(&mut slots, -amount);
        }
    }

    let mut total: i128 = 0;
    let mut allocations = Vec::with_capacity(slots.len());
    for slot in &slots {
        total += slot.allocated;
        let cents = i64::try_from(slot.allocated)
            .map_err(|_| DomainError::invariant("allocation exceeds representable amount"))?;
        let paid_amount = Amount::from_cents(cents);
        let state = if (slot.invoice.amount() - paid_amount).is_positive() {
            InvoiceState::Open
        } else {
            InvoiceState::Closed
        };
        allocations.push(InvoiceAllocation {
            invoice_id: slot.invoice.id_typed(),
            paid_amount,
            state,
        });
    }

    let expected: i128 = payments
        .iter()
        .map(|payment| payment.amount().cents() as i128)
        .sum();
    if total != expected {
        return Err(DomainError::invariant(format!(
            "redistribution out of balance: allocated {total} cents, payments total {expected} cents"
        )));
    }

    Ok(allocations)
}

/// Apply a positive floating amount, returning the updated preference.
fn fill(
    slots: &mut [Slot<'_>],
    mut remaining: i128,
    mut current: Option<(SourceKind, FiscalYear)>,
) -> Option<(SourceKind, FiscalYear)> {
    while remaining > 0 {
        let Some(ix) = next_target(slots, current) else {
            // Every invoice is full: the surplus lands on the last invoice
            // in order.
            let last = slots.len() - 1;
            slots[last].allocated += remaining;
            return Some(slots[last].preference_key());
        };
        let take = remaining.min(slots[ix].room());
        slots[ix].allocated += take;
        remaining -= take;
        current = Some(slots[ix].preference_key());
    }
    current
}

/// Next invoice with room, preferring the current source kind within the
/// current fiscal year; slots are in base order, so `position` picks the
/// earliest-dated candidate.
fn next_target(slots: &[Slot<'_>], current: Option<(SourceKind, FiscalYear)>) -> Option<usize> {
    if let Some(key) = current {
        let preferred = slots
            .iter()
            .position(|slot| slot.room() > 0 && slot.preference_key() == key);
        if preferred.is_some() {
            return preferred;
        }
    }
    slots.iter().position(|slot| slot.room() > 0)
}

/// Apply a negative floating amount: drain from the earliest invoice,
/// respecting pre-assigned floors. Residue no floor allows lands on the
/// last invoice in order, mirroring the overpayment rule, so the
/// member-level balance stays exact.
fn drain(slots: &mut [Slot<'_>], mut needed: i128) {
    for slot in slots.iter_mut() {
        if needed == 0 {
            return;
        }
        let drainable = (slot.allocated - slot.floor).max(0);
        let take = needed.min(drainable);
        slot.allocated -= take;
        needed -= take;
    }
    if needed > 0 {
        let last = slots.len() - 1;
        slots[last].allocated -= needed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InvoiceSource;
    use chrono::{DateTime, Month, NaiveDate, TimeZone, Utc};
    use cropshare_core::{ActivityParticipationId, MemberId, MembershipId, PaymentId, TenantId};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + seconds, 0).unwrap()
    }

    fn ctx(tenant_id: TenantId) -> OrgContext {
        OrgContext::new(tenant_id, Month::January, date(2026, 6, 15))
    }

    struct Fixture {
        tenant_id: TenantId,
        member_id: MemberId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tenant_id: TenantId::new(),
                member_id: MemberId::new(),
            }
        }

        fn open_invoice(&self, date: NaiveDate, source: InvoiceSource, amount: Amount) -> Invoice {
            let mut invoice = Invoice::new(
                InvoiceId::new(),
                self.tenant_id,
                self.member_id,
                date,
                source,
                amount,
            )
            .unwrap();
            invoice.finish_processing().unwrap();
            invoice
        }

        fn payment(&self, target: Option<InvoiceId>, amount: Amount, order: i64) -> Payment {
            Payment::new(
                PaymentId::new(),
                self.tenant_id,
                self.member_id,
                target,
                amount,
                date(2026, 6, 1),
                at(order),
            )
            .unwrap()
        }
    }

    fn paid(allocations: &[InvoiceAllocation], invoice: &Invoice) -> Amount {
        allocations
            .iter()
            .find(|a| a.invoice_id == invoice.id_typed())
            .unwrap()
            .paid_amount
    }

    fn state(allocations: &[InvoiceAllocation], invoice: &Invoice) -> InvoiceState {
        allocations
            .iter()
            .find(|a| a.invoice_id == invoice.id_typed())
            .unwrap()
            .state
    }

    #[test]
    fn overpayment_lands_on_the_last_invoice() {
        let fx = Fixture::new();
        let a = fx.open_invoice(date(2026, 1, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let b = fx.open_invoice(date(2026, 2, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let c = fx.open_invoice(date(2026, 3, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let invoices = vec![a.clone(), b.clone(), c.clone()];
        let payments = vec![fx.payment(None, Amount::new(35, 0), 0)];

        let allocations = redistribute(&invoices, &payments, &ctx(fx.tenant_id)).unwrap();

        assert_eq!(paid(&allocations, &a), Amount::new(10, 0));
        assert_eq!(paid(&allocations, &b), Amount::new(10, 0));
        assert_eq!(paid(&allocations, &c), Amount::new(15, 0));
        assert_eq!(state(&allocations, &a), InvoiceState::Closed);
        assert_eq!(state(&allocations, &b), InvoiceState::Closed);
        assert_eq!(state(&allocations, &c), InvoiceState::Closed);
    }

    #[test]
    fn refund_reopens_a_settled_invoice() {
        let fx = Fixture::new();
        let invoice = fx.open_invoice(date(2026, 1, 5), InvoiceSource::AnnualFee, Amount::new(5, 0));
        let invoices = vec![invoice.clone()];
        let payments = vec![
            fx.payment(None, Amount::new(5, 0), 0),
            fx.payment(None, Amount::new(-5, 0), 1),
        ];

        let allocations = redistribute(&invoices, &payments, &ctx(fx.tenant_id)).unwrap();

        assert_eq!(paid(&allocations, &invoice), Amount::ZERO);
        assert_eq!(state(&allocations, &invoice), InvoiceState::Open);
    }

    #[test]
    fn pre_assignment_is_a_floor_for_drains() {
        let fx = Fixture::new();
        let a = fx.open_invoice(date(2026, 1, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let b = fx.open_invoice(date(2026, 2, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let invoices = vec![a.clone(), b.clone()];
        let payments = vec![
            fx.payment(Some(a.id_typed()), Amount::new(10, 0), 0),
            fx.payment(None, Amount::new(5, 0), 1),
            fx.payment(None, Amount::new(-5, 0), 2),
        ];

        let allocations = redistribute(&invoices, &payments, &ctx(fx.tenant_id)).unwrap();

        // the drain takes the floating 5 from b; a's pre-assigned 10 is untouched
        assert_eq!(paid(&allocations, &a), Amount::new(10, 0));
        assert_eq!(paid(&allocations, &b), Amount::ZERO);
    }

    #[test]
    fn drain_residue_lands_on_the_last_invoice() {
        let fx = Fixture::new();
        let a = fx.open_invoice(date(2026, 1, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let b = fx.open_invoice(date(2026, 2, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let invoices = vec![a.clone(), b.clone()];
        let payments = vec![
            fx.payment(Some(a.id_typed()), Amount::new(10, 0), 0),
            fx.payment(None, Amount::new(5, 0), 1),
            fx.payment(None, Amount::new(-8, 0), 2),
        ];

        let allocations = redistribute(&invoices, &payments, &ctx(fx.tenant_id)).unwrap();

        // floors protect a; the 3 cents of residue that no floor allows are
        // carried by the last invoice so the member balance stays exact
        assert_eq!(paid(&allocations, &a), Amount::new(10, 0));
        assert_eq!(paid(&allocations, &b), Amount::new(-3, 0));
        let total: Amount = allocations.iter().map(|a| a.paid_amount).sum();
        let expected: Amount = payments.iter().map(|p| p.amount()).sum();
        assert_eq!(total, expected);
    }

    #[test]
    fn same_kind_invoices_are_preferred_within_a_fiscal_year() {
        let fx = Fixture::new();
        let m1 = fx.open_invoice(
            date(2026, 1, 5),
            InvoiceSource::Membership {
                membership_id: MembershipId::new(),
            },
            Amount::new(10, 0),
        );
        let a1 = fx.open_invoice(
            date(2026, 1, 10),
            InvoiceSource::ActivityParticipation {
                participation_id: ActivityParticipationId::new(),
            },
            Amount::new(10, 0),
        );
        let m2 = fx.open_invoice(
            date(2026, 2, 1),
            InvoiceSource::Membership {
                membership_id: MembershipId::new(),
            },
            Amount::new(10, 0),
        );
        let invoices = vec![m1.clone(), a1.clone(), m2.clone()];
        let payments = vec![fx.payment(None, Amount::new(25, 0), 0)];

        let allocations = redistribute(&invoices, &payments, &ctx(fx.tenant_id)).unwrap();

        // after filling m1, the later membership invoice m2 is preferred
        // over the earlier-dated activity invoice a1
        assert_eq!(paid(&allocations, &m1), Amount::new(10, 0));
        assert_eq!(paid(&allocations, &m2), Amount::new(10, 0));
        assert_eq!(paid(&allocations, &a1), Amount::new(5, 0));
    }

    #[test]
    fn kind_preference_does_not_cross_fiscal_years() {
        let fx = Fixture::new();
        let tenant_id = fx.tenant_id;
        // fiscal years start in April
        let ctx = OrgContext::new(tenant_id, Month::April, date(2026, 6, 15));

        let m1 = fx.open_invoice(
            date(2025, 6, 1),
            InvoiceSource::Membership {
                membership_id: MembershipId::new(),
            },
            Amount::new(10, 0),
        );
        let a1 = fx.open_invoice(
            date(2025, 7, 1),
            InvoiceSource::ActivityParticipation {
                participation_id: ActivityParticipationId::new(),
            },
            Amount::new(10, 0),
        );
        let m2 = fx.open_invoice(
            date(2026, 6, 1),
            InvoiceSource::Membership {
                membership_id: MembershipId::new(),
            },
            Amount::new(10, 0),
        );
        let invoices = vec![m1.clone(), a1.clone(), m2.clone()];
        let payments = vec![fx.payment(None, Amount::new(25, 0), 0)];

        let allocations = redistribute(&invoices, &payments, &ctx).unwrap();

        // m2 is the same kind as m1 but in the next fiscal year, so the
        // preference does not reach it; a1 fills first
        assert_eq!(paid(&allocations, &m1), Amount::new(10, 0));
        assert_eq!(paid(&allocations, &a1), Amount::new(10, 0));
        assert_eq!(paid(&allocations, &m2), Amount::new(5, 0));
    }

    #[test]
    fn payments_assigned_to_a_canceled_invoice_reflow() {
        let fx = Fixture::new();
        let ctx = ctx(fx.tenant_id);
        let mut a =
            fx.open_invoice(date(2026, 1, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let b = fx.open_invoice(date(2026, 2, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let payments = vec![fx.payment(Some(a.id_typed()), Amount::new(10, 0), 0)];

        a.cancel(Utc::now(), &ctx).unwrap();
        let invoices = vec![a.clone(), b.clone()];

        let allocations = redistribute(&invoices, &payments, &ctx).unwrap();

        assert!(allocations.iter().all(|x| x.invoice_id != a.id_typed()));
        assert_eq!(paid(&allocations, &b), Amount::new(10, 0));
        assert_eq!(state(&allocations, &b), InvoiceState::Closed);
    }

    #[test]
    fn a_single_cent_goes_to_exactly_one_invoice() {
        let fx = Fixture::new();
        let a = fx.open_invoice(date(2026, 1, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let b = fx.open_invoice(date(2026, 2, 5), InvoiceSource::AnnualFee, Amount::new(10, 0));
        let invoices = vec![a.clone(), b.clone()];
        let payments = vec![fx.payment(None, Amount::from_cents(1), 0)];

        let allocations = redistribute(&invoices, &payments, &ctx(fx.tenant_id)).unwrap();

        assert_eq!(paid(&allocations, &a), Amount::from_cents(1));
        assert_eq!(paid(&allocations, &b), Amount::ZERO);
    }

    #[test]
    fn no_allocatable_invoices_means_no_allocations() {
        let fx = Fixture::new();
        let processing = Invoice::new(
            InvoiceId::new(),
            fx.tenant_id,
            fx.member_id,
            date(2026, 1, 5),
            InvoiceSource::AnnualFee,
            Amount::new(10, 0),
        )
        .unwrap();
        let payments = vec![fx.payment(None, Amount::new(10, 0), 0)];

        let allocations =
            redistribute(&[processing], &payments, &ctx(fx.tenant_id)).unwrap();
        assert!(allocations.is_empty());
    }

    proptest! {
        #[test]
        fn balances_and_is_idempotent(
            amounts in prop::collection::vec(1i64..50_000, 1..6),
            payment_specs in prop::collection::vec(
                ((-30_000i64..30_000).prop_filter("nonzero", |a| *a != 0), 0usize..8),
                0..8,
            ),
        ) {
            let fx = Fixture::new();
            let invoices: Vec<Invoice> = amounts
                .iter()
                .enumerate()
                .map(|(ix, cents)| {
                    fx.open_invoice(
                        date(2026, 1, 1 + ix as u32),
                        InvoiceSource::AnnualFee,
                        Amount::from_cents(*cents),
                    )
                })
                .collect();
            let payments: Vec<Payment> = payment_specs
                .iter()
                .enumerate()
                .map(|(ix, (cents, target))| {
                    // roughly half of the payments are pre-assigned
                    let target = if target % 2 == 0 {
                        Some(invoices[target % invoices.len()].id_typed())
                    } else {
                        None
                    };
                    fx.payment(target, Amount::from_cents(*cents), ix as i64)
                })
                .collect();
            let ctx = ctx(fx.tenant_id);

            let first = redistribute(&invoices, &payments, &ctx).unwrap();

            // global balance invariant, to the cent
            let allocated: i64 = first.iter().map(|a| a.paid_amount.cents()).sum();
            let expected: i64 = payments.iter().map(|p| p.amount().cents()).sum();
            prop_assert_eq!(allocated, expected);

            // idempotence: same inputs, same result
            let second = redistribute(&invoices, &payments, &ctx).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
