//! Shared type definitions.

pub mod id;
pub mod iin;

pub use id::{
    DeclarationId, RuleId, SourceRecordId, TaxEventId, TaxpayerId, ValidationReportId, XmlExportId,
};
pub use iin::Iin;
