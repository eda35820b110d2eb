//! Report PDF rendering. Output is a plain Helvetica text document built with
//! `lopdf`, one text object per page with a `T*` move between lines.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::models::LeaseAbstract;

const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const MARGIN_LEFT: i64 = 56;
const FIRST_BASELINE: i64 = 736;
const LINE_HEIGHT: i64 = 16;
const FONT_SIZE: i64 = 11;
const MAX_VALUE_CHARS: usize = 90;

pub fn report_lines(audit_id: &str, lease: &LeaseAbstract) -> Vec<String> {
    let field = |value: Option<&str>| match value {
        Some(value) => clip(value),
        None => "not found".to_string(),
    };
    let term = lease
        .term_months
        .map(|months| format!("{months} months"))
        .unwrap_or_else(|| "not found".to_string());

    vec![
        "CAM / NNN Lease Audit - Lease Abstract".to_string(),
        format!("Audit ID: {}", clip(audit_id)),
        String::new(),
        format!("Tenant: {}", field(lease.tenant_name.as_deref())),
        format!("Landlord: {}", field(lease.landlord_name.as_deref())),
        format!("Premises: {}", field(lease.premises.as_deref())),
        format!("Commencement Date: {}", field(lease.lease_start.as_deref())),
        format!("Expiration Date: {}", field(lease.lease_end.as_deref())),
        format!("Base Rent: {}", field(lease.base_rent.as_deref())),
        format!("Term: {term}"),
        String::new(),
        format!(
            "Extraction confidence: {} ({} characters of lease text)",
            lease.confidence.as_str(),
            lease.raw_text_length
        ),
        "Fields are matched from labeled lines in the uploaded lease.".to_string(),
        "Verify every value against the executed document.".to_string(),
    ]
}

pub fn render_report(audit_id: &str, lease: &LeaseAbstract) -> Result<Vec<u8>, String> {
    text_pdf(&[report_lines(audit_id, lease)])
}

/// Builds a PDF with one page per entry of `pages`, lines set on successive baselines.
pub fn text_pdf(pages: &[Vec<String>]) -> Result<Vec<u8>, String> {
    operations_pdf(pages.iter().map(|lines| page_operations(lines)).collect())
}

/// Builds a PDF whose pages carry the given content operations, with a
/// WinAnsi Helvetica font bound to `F1`.
pub(crate) fn operations_pdf(pages: Vec<Vec<Operation>>) -> Result<Vec<u8>, String> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let encoded = content
            .encode()
            .map_err(|err| format!("encode page content failed: {err}"))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|err| format!("write pdf failed: {err}"))?;
    Ok(buffer)
}

fn page_operations(lines: &[String]) -> Vec<Operation> {
    let mut operations = Vec::with_capacity(lines.len() * 2 + 5);
    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new(
        "Tf",
        vec![Object::Name(b"F1".to_vec()), Object::Integer(FONT_SIZE)],
    ));
    operations.push(Operation::new("TL", vec![Object::Integer(LINE_HEIGHT)]));
    operations.push(Operation::new(
        "Td",
        vec![Object::Integer(MARGIN_LEFT), Object::Integer(FIRST_BASELINE)],
    ));
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            operations.push(Operation::new("T*", vec![]));
        }
        if !line.is_empty() {
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(printable(line))],
            ));
        }
    }
    operations.push(Operation::new("ET", vec![]));
    operations
}

fn clip(value: &str) -> String {
    if value.chars().count() <= MAX_VALUE_CHARS {
        return value.to_string();
    }
    let mut clipped: String = value.chars().take(MAX_VALUE_CHARS - 3).collect();
    clipped.push_str("...");
    clipped
}

// Standard-14 fonts only cover single-byte text.
fn printable(line: &str) -> String {
    line.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}
