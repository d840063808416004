//! Explicit per-tenant organization context.

use chrono::{Month, NaiveDate};

use crate::fiscal::FiscalYear;
use crate::id::TenantId;

/// Tenant configuration handed explicitly to billing operations.
///
/// No ambient per-request state: the tenant, its fiscal-year boundaries,
/// the reference date ("today", injected so domain logic never reads the
/// wall clock), and the VAT rate applied at processing time all travel
/// through this object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgContext {
    tenant_id: TenantId,
    fiscal_year_start: Month,
    today: NaiveDate,
    vat_rate_bp: Option<u32>,
}

impl OrgContext {
    pub fn new(tenant_id: TenantId, fiscal_year_start: Month, today: NaiveDate) -> Self {
        Self {
            tenant_id,
            fiscal_year_start,
            today,
            vat_rate_bp: None,
        }
    }

    /// VAT rate in basis points (810 means 8.10%), applied when invoices are
    /// processed. Tenants without VAT registration leave this unset.
    pub fn with_vat_rate_bp(mut self, rate_bp: u32) -> Self {
        self.vat_rate_bp = Some(rate_bp);
        self
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn vat_rate_bp(&self) -> Option<u32> {
        self.vat_rate_bp
    }

    pub fn current_fiscal_year(&self) -> FiscalYear {
        FiscalYear::containing(self.today, self.fiscal_year_start)
    }

    pub fn fiscal_year_of(&self, date: NaiveDate) -> FiscalYear {
        FiscalYear::containing(date, self.fiscal_year_start)
    }
}
