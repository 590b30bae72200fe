//! Serialization of declaration items into the regulator's `<fno>` tree.
//!
//! The document layout is driven entirely by the persisted XML field
//! map: one `<form>` block per application 270.00–270.07, one sheet per
//! form, fields emitted in the map's declared order. Identical inputs
//! produce identical bytes.

use chrono::NaiveDate;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::declaration::{DeclarationKind, SnapshotHeader};

/// The eight application codes of form 270.00, in emission order.
pub const APPLICATION_CODES: [&str; 8] = ["00", "01", "02", "03", "04", "05", "06", "07"];

/// One row of the persisted XML field map, in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapRow {
    /// Application code, `"00"` through `"07"`.
    pub application_code: String,
    /// Logical field the value comes from; `None` for header fields
    /// filled from declaration attributes.
    pub logical_field: Option<String>,
    /// XML element name.
    pub xml_field_name: String,
}

/// The declaration data the projector reads.
#[derive(Debug, Clone)]
pub struct DeclarationView<'a> {
    /// Tax period year.
    pub tax_year: i32,
    /// Declaration kind.
    pub kind: DeclarationKind,
    /// Snapshot header.
    pub header: &'a SnapshotHeader,
    /// Date the declaration was filled.
    pub filled_at: Option<NaiveDate>,
    /// Declaration flags.
    pub flags: &'a BTreeMap<String, bool>,
    /// Item values by logical field.
    pub items: &'a BTreeMap<String, Decimal>,
}

/// A serialized document with its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// The UTF-8 XML payload.
    pub payload: String,
    /// Hex SHA-256 over the payload bytes.
    pub content_hash: String,
}

/// Projection failures.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The writer failed; should not happen with an in-memory sink.
    #[error("xml write failed: {0}")]
    Write(String),

    /// The produced document failed the structural self-check.
    #[error("structural self-check failed")]
    StructuralCheckFailed,
}

/// Deterministic projector for form 270.00.
pub struct XmlProjector;

impl XmlProjector {
    /// Serializes the declaration into the `<fno>` tree.
    ///
    /// `field_map` must be ordered the way the fields are to be
    /// emitted; rows are grouped by application code.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the result does not
    /// pass the structural self-check.
    pub fn project(
        view: &DeclarationView<'_>,
        field_map: &[FieldMapRow],
    ) -> Result<XmlDocument, ProjectionError> {
        let mut writer = Writer::new(Vec::new());
        let write = |e: Event<'_>, w: &mut Writer<Vec<u8>>| {
            w.write_event(e).map_err(|err| ProjectionError::Write(err.to_string()))
        };

        write(
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
            &mut writer,
        )?;

        let mut root = BytesStart::new("fno");
        root.push_attribute(("code", "270.00"));
        root.push_attribute(("formatVersion", "1"));
        root.push_attribute(("version", "2"));
        root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        root.push_attribute(("xmlns:xsd", "http://www.w3.org/2001/XMLSchema"));
        write(Event::Start(root), &mut writer)?;

        for application in APPLICATION_CODES {
            let form_name = format!("form_270_{application}");
            let sheet_name = format!("page_270_{application}_01");

            let mut form = BytesStart::new("form");
            form.push_attribute(("name", form_name.as_str()));
            write(Event::Start(form), &mut writer)?;

            let mut sheet = BytesStart::new("sheet");
            sheet.push_attribute(("name", sheet_name.as_str()));
            write(Event::Start(sheet), &mut writer)?;

            for row in field_map
                .iter()
                .filter(|row| row.application_code == application)
            {
                let value = Self::resolve(view, row);
                let mut field = BytesStart::new("field");
                field.push_attribute(("name", row.xml_field_name.as_str()));
                match value {
                    Some(text) if !text.is_empty() => {
                        write(Event::Start(field), &mut writer)?;
                        write(Event::Text(BytesText::new(&text)), &mut writer)?;
                        write(Event::End(BytesEnd::new("field")), &mut writer)?;
                    }
                    _ => write(Event::Empty(field), &mut writer)?,
                }
            }

            write(Event::End(BytesEnd::new("sheet")), &mut writer)?;
            write(Event::End(BytesEnd::new("form")), &mut writer)?;
        }

        write(Event::End(BytesEnd::new("fno")), &mut writer)?;

        let payload = String::from_utf8(writer.into_inner())
            .map_err(|err| ProjectionError::Write(err.to_string()))?;
        if !Self::self_check(&payload) {
            return Err(ProjectionError::StructuralCheckFailed);
        }
        let content_hash = content_hash(&payload);
        Ok(XmlDocument {
            payload,
            content_hash,
        })
    }

    /// Resolves a field-map row to its rendered value; `None` renders
    /// as an empty element.
    fn resolve(view: &DeclarationView<'_>, row: &FieldMapRow) -> Option<String> {
        match &row.logical_field {
            Some(code) => view.items.get(code).and_then(|v| format_amount(*v)),
            None => Self::header_value(view, &row.xml_field_name),
        }
    }

    /// Fills a header field from declaration attributes.
    fn header_value(view: &DeclarationView<'_>, name: &str) -> Option<String> {
        let header = view.header;
        match name {
            "iin" => Some(header.iin.clone()),
            "period_year" => Some(view.tax_year.to_string()),
            "fio1" => header.last_name.clone(),
            "fio2" => header.first_name.clone(),
            "fio3" => header.middle_name.clone(),
            "email" => header.email.clone(),
            "payer_phone_number" => header.phone.clone(),
            "spouse_iin" => header.spouse_iin.clone(),
            "legal_rep_iin" => header.legal_rep_iin.clone(),
            "date_fill" => view.filled_at.map(format_date),
            "dt_main" | "dt_regular" | "dt_additional" | "dt_notice" => {
                (view.kind.xml_flag() == name).then(|| "1".to_string())
            }
            _ if name.starts_with("pril_") => view
                .flags
                .get(name)
                .copied()
                .unwrap_or(false)
                .then(|| "1".to_string()),
            _ => None,
        }
    }

    /// Cheap structural self-check over the produced payload.
    #[must_use]
    pub fn self_check(payload: &str) -> bool {
        payload.starts_with("<?xml")
            && payload.contains("<fno")
            && payload.contains("form_270_00")
            && payload.contains("form_270_01")
    }
}

/// Renders a money value: half-up nearest integer as ASCII digits;
/// zero renders as an empty element.
#[must_use]
pub fn format_amount(value: Decimal) -> Option<String> {
    let rounded = value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    if rounded.is_zero() {
        None
    } else {
        Some(rounded.to_string())
    }
}

/// Renders a date as `DD.MM.YYYY`.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Hex SHA-256 over the payload bytes.
#[must_use]
pub fn content_hash(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}
