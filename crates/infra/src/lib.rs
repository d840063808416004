//! In-process infrastructure: ledger storage, orchestration, collaborators.

pub mod collaborators;
pub mod ledger;
pub mod orchestrator;
pub mod service;


pub use collaborators::{NoopRenderer, RecordingMailer, RecordingNotifier};
pub use ledger::{InMemoryLedger, MemberLedgerStore};
pub use orchestrator::BillingOrchestrator;
pub use service::InvoiceService;
