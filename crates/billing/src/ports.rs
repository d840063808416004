//! Collaborator seams: rendering, delivery, admin notification.
//!
//! Rendering and delivery are black boxes that may fail independently of
//! invoice state. Financial state never rolls back because a collaborator
//! failed; those failures are reported and suppressed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::invoice::Invoice;

/// Opaque reference to a rendered invoice document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PdfRef(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("pdf rendering failed: {0}")]
pub struct RenderError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Renders the member-facing PDF for an invoice.
pub trait InvoiceRenderer: Send + Sync {
    fn render(&self, invoice: &Invoice) -> Result<PdfRef, RenderError>;
}

/// Delivers the invoice email with the rendered document attached.
pub trait InvoiceMailer: Send + Sync {
    fn deliver(&self, invoice: &Invoice) -> Result<(), MailError>;
}

/// Admin-facing notifications. Fire-and-forget: implementations must not
/// fail the calling operation.
pub trait AdminNotifier: Send + Sync {
    /// An invoice transitioned into overpayment.
    fn invoice_overpaid(&self, invoice: &Invoice);

    /// A best-effort collaborator step failed and was suppressed.
    fn delivery_failed(&self, invoice: &Invoice, reason: &str);
}
