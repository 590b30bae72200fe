//! `SeaORM` entity definitions for the filing tables.

pub mod declaration_items;
pub mod declarations;
pub mod logical_fields;
pub mod source_records;
pub mod tax_event_types;
pub mod tax_events;
pub mod tax_mappings;
pub mod tax_rules;
pub mod taxpayers;
pub mod validation_reports;
pub mod xml_exports;
pub mod xml_field_map;
