//! Lease audit domain: PDF text extraction, lease field abstraction, report
//! rendering, and the collaborators (audit store, object storage, mail) the
//! ingestion pipeline runs against.

pub mod abstractor;
pub mod bootstrap;
pub mod mailer;
pub mod models;
pub mod pdf;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod store;

pub use abstractor::abstract_lease;
pub use models::{AuditRecord, AuditStatus, Confidence, Lead, LeaseAbstract, NewAudit};
pub use pipeline::{IngestJob, IngestOutcome, Pipeline, PipelineConfig, PipelineError};
