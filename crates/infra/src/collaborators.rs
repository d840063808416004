//! In-process collaborator implementations for tests/dev.

use std::sync::{Mutex, PoisonError};

use cropshare_billing::{
    AdminNotifier, Invoice, InvoiceMailer, InvoiceRenderer, MailError, PdfRef, RenderError,
};
use cropshare_core::InvoiceId;

/// Renderer that produces an in-memory document reference.
#[derive(Debug, Default)]
pub struct NoopRenderer;

impl InvoiceRenderer for NoopRenderer {
    fn render(&self, invoice: &Invoice) -> Result<PdfRef, RenderError> {
        Ok(PdfRef(format!("memory://invoices/{}.pdf", invoice.id_typed())))
    }
}

/// Mailer that records deliveries and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    fail_with: Mutex<Option<String>>,
    delivered: Mutex<Vec<InvoiceId>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Mutex::new(Some(reason.into())),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn delivered(&self) -> Vec<InvoiceId> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl InvoiceMailer for RecordingMailer {
    fn deliver(&self, invoice: &Invoice) -> Result<(), MailError> {
        let fail_with = self
            .fail_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(reason) = fail_with {
            return Err(MailError(reason));
        }
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invoice.id_typed());
        Ok(())
    }
}

/// Notifier that records what admins would be alerted about.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    overpaid: Mutex<Vec<InvoiceId>>,
    failures: Mutex<Vec<(InvoiceId, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overpaid(&self) -> Vec<InvoiceId> {
        self.overpaid
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn failures(&self) -> Vec<(InvoiceId, String)> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AdminNotifier for RecordingNotifier {
    fn invoice_overpaid(&self, invoice: &Invoice) {
        self.overpaid
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invoice.id_typed());
    }

    fn delivery_failed(&self, invoice: &Invoice, reason: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((invoice.id_typed(), reason.to_string()));
    }
}
