//! `cropshare-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, monetary amounts, fiscal years, the explicit
//! per-tenant organization context, and the domain error taxonomy.

pub mod context;
pub mod entity;
pub mod error;
pub mod fiscal;
pub mod id;
pub mod money;
pub mod value_object;

pub use context::OrgContext;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use fiscal::FiscalYear;
pub use id::{
    ActivityParticipationId, InvoiceId, MemberId, MembershipId, PaymentId, ShopOrderId, TenantId,
};
pub use money::Amount;
pub use value_object::ValueObject;
