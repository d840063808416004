//! `cropshare-billing` — invoices, payments and payment redistribution.
//!
//! Pure domain logic, no IO: the invoice state machine, payment validation,
//! and the deterministic allocation of a member's payments across their
//! invoices. Collaborators (PDF rendering, mail delivery, admin
//! notifications) are ports implemented in `cropshare-infra`.

pub mod event;
pub mod invoice;
pub mod payment;
pub mod ports;
pub mod redistribute;
pub mod source;

pub use event::{
    BillingEvent, InvoiceCanceled, InvoiceOverpaid, InvoiceProcessed, PaymentRecorded,
    PaymentRemoved, PaymentUpdated,
};
pub use invoice::{Invoice, InvoiceState, VatBreakdown};
pub use payment::Payment;
pub use ports::{AdminNotifier, InvoiceMailer, InvoiceRenderer, MailError, PdfRef, RenderError};
pub use redistribute::{InvoiceAllocation, redistribute};
pub use source::{InvoiceSource, SourceKind};
