use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_MAX_PDF_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_MAX_PDF_PAGES: usize = 300;

#[derive(Debug, Clone, Copy)]
pub struct ExtractLimits {
    pub max_bytes: usize,
    pub max_pages: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_PDF_BYTES,
            max_pages: DEFAULT_MAX_PDF_PAGES,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("document is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("document has {pages} pages, limit is {max}")]
    TooManyPages { pages: usize, max: usize },
    #[error("not a readable pdf: {0}")]
    Parse(String),
    #[error("page {page} text could not be decoded: {message}")]
    Page { page: u32, message: String },
}

/// Text of every page in page order, one newline between pages.
pub fn extract_text(bytes: &[u8], limits: &ExtractLimits) -> Result<String, ExtractError> {
    if bytes.len() > limits.max_bytes {
        return Err(ExtractError::TooLarge {
            size: bytes.len(),
            max: limits.max_bytes,
        });
    }

    let doc = Document::load_mem(bytes).map_err(|err| ExtractError::Parse(err.to_string()))?;

    // BTreeMap keyed by page number, so iteration is already in page order.
    let pages = doc.get_pages();
    if pages.len() > limits.max_pages {
        return Err(ExtractError::TooManyPages {
            pages: pages.len(),
            max: limits.max_pages,
        });
    }

    let mut parts = Vec::with_capacity(pages.len());
    for (&page, &page_id) in &pages {
        let text = page_text(&doc, page_id).map_err(|err| ExtractError::Page {
            page,
            message: err.to_string(),
        })?;
        parts.push(text.trim_end().to_string());
    }

    tracing::debug!(pages = parts.len(), bytes = bytes.len(), "pdf text extracted");
    Ok(parts.join("\n"))
}

// Kerning offsets in a TJ array wider than this (thousandths of an em) read as a word gap.
const TJ_WORD_GAP: f32 = -100.0;

/// Walks the page content stream and emits its text runs. Moves to a new
/// baseline (`Td`/`TD` with a vertical offset, `T*`, `'`, `"`, a `Tm` on
/// another row, the end of a text object) become `\n`; moves along the same
/// baseline become a space.
fn page_text(doc: &Document, page_id: ObjectId) -> lopdf::Result<String> {
    let encodings: BTreeMap<Vec<u8>, &str> = doc
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect();
    let content = doc.get_and_decode_page_content(page_id)?;

    let mut text = TextSink::default();
    let mut encoding: Option<&str> = None;
    let mut row: Option<f32> = None;
    for operation in &content.operations {
        let operands = operation.operands.as_slice();
        match operation.operator.as_str() {
            "Tf" => {
                encoding = operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| encodings.get(name).copied());
            }
            "Td" | "TD" => {
                let dy = operands.get(1).and_then(|dy| dy.as_float().ok()).unwrap_or(0.0);
                if dy.abs() > f32::EPSILON {
                    text.break_line();
                } else {
                    text.break_word();
                }
            }
            "Tm" => {
                let y = operands.get(5).and_then(|y| y.as_float().ok());
                match (row, y) {
                    (Some(previous), Some(y)) if (previous - y).abs() <= f32::EPSILON => {
                        text.break_word()
                    }
                    _ => text.break_line(),
                }
                row = y;
            }
            "T*" | "ET" => text.break_line(),
            "Tj" | "TJ" => text.push_operands(encoding, operands),
            "'" => {
                text.break_line();
                text.push_operands(encoding, operands);
            }
            "\"" => {
                text.break_line();
                text.push_operands(encoding, operands.get(2..).unwrap_or_default());
            }
            _ => {}
        }
    }
    Ok(text.finish())
}

#[derive(Default)]
struct TextSink {
    out: String,
    pending: Option<char>,
}

impl TextSink {
    fn break_line(&mut self) {
        self.pending = Some('\n');
    }

    fn break_word(&mut self) {
        if self.pending.is_none() {
            self.pending = Some(' ');
        }
    }

    fn push_str(&mut self, value: &str) {
        if value.is_empty() {
            return;
        }
        match self.pending.take() {
            Some('\n') if !self.out.is_empty() => {
                let kept = self.out.trim_end_matches([' ', '\t']).len();
                self.out.truncate(kept);
                if !self.out.ends_with('\n') {
                    self.out.push('\n');
                }
            }
            Some(separator) if !self.out.is_empty() && !self.out.ends_with(char::is_whitespace) => {
                self.out.push(separator);
            }
            _ => {}
        }
        self.out.push_str(value);
    }

    fn push_operands(&mut self, encoding: Option<&str>, operands: &[Object]) {
        for operand in operands {
            match operand {
                Object::String(bytes, _) => self.push_str(&Document::decode_text(encoding, bytes)),
                Object::Array(items) => self.push_operands(encoding, items),
                Object::Integer(_) | Object::Real(_) => {
                    if operand.as_float().is_ok_and(|offset| offset < TJ_WORD_GAP) {
                        self.break_word();
                    }
                }
                _ => {}
            }
        }
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Runs [`extract_text`] on the blocking pool.
pub async fn extract_text_blocking(
    bytes: Vec<u8>,
    limits: ExtractLimits,
) -> Result<String, ExtractError> {
    tokio::task::spawn_blocking(move || extract_text(&bytes, &limits))
        .await
        .map_err(|err| ExtractError::Parse(format!("extraction task failed: {err}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstractor::abstract_lease;
    use crate::report::{operations_pdf, text_pdf};
    use lopdf::content::Operation;

    fn text_object(moves: Vec<Operation>) -> Vec<u8> {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 11.into()]),
            Operation::new("TL", vec![14.into()]),
        ];
        operations.extend(moves);
        operations.push(Operation::new("ET", vec![]));
        operations_pdf(vec![operations]).unwrap()
    }

    fn show(text: &str) -> Operation {
        Operation::new("Tj", vec![Object::string_literal(text)])
    }

    fn three_page_pdf() -> Vec<u8> {
        text_pdf(&[
            vec!["Tenant: First Page Tenant".to_string()],
            vec!["Middle page clause".to_string()],
            vec!["Expiration Date: closing page".to_string()],
        ])
        .unwrap()
    }

    #[test]
    fn pages_are_concatenated_in_order() {
        let text = extract_text(&three_page_pdf(), &ExtractLimits::default()).unwrap();
        let first = text.find("First Page Tenant").expect("page 1 present");
        let middle = text.find("Middle page clause").expect("page 2 present");
        let last = text.find("closing page").expect("page 3 present");
        assert!(first < middle && middle < last);
    }

    #[test]
    fn lines_within_one_text_object_stay_separate() {
        let pdf = text_object(vec![
            Operation::new("Td", vec![56.into(), 736.into()]),
            show("Tenant: Blue Door Coffee"),
            Operation::new("T*", vec![]),
            show("Landlord: Maple Grove"),
            Operation::new("Td", vec![0.into(), (-14).into()]),
            show("Premises: Suite 140"),
        ]);

        let text = extract_text(&pdf, &ExtractLimits::default()).unwrap();
        assert_eq!(
            text,
            "Tenant: Blue Door Coffee\nLandlord: Maple Grove\nPremises: Suite 140"
        );
        let lease = abstract_lease(&text);
        assert_eq!(lease.tenant_name.as_deref(), Some("Blue Door Coffee"));
        assert_eq!(lease.landlord_name.as_deref(), Some("Maple Grove"));
        assert_eq!(lease.premises.as_deref(), Some("Suite 140"));
    }

    #[test]
    fn quote_operators_and_text_matrix_start_new_lines() {
        let pdf = text_object(vec![
            Operation::new("Tm", vec![1.into(), 0.into(), 0.into(), 1.into(), 56.into(), 700.into()]),
            show("Tenant: Harbor Yoga"),
            Operation::new("'", vec![Object::string_literal("Landlord: Pier Nine")]),
            Operation::new(
                "\"",
                vec![0.into(), 0.into(), Object::string_literal("Base Rent: $4,000")],
            ),
            Operation::new("Tm", vec![1.into(), 0.into(), 0.into(), 1.into(), 56.into(), 650.into()]),
            show("Term: 60 months"),
        ]);

        let text = extract_text(&pdf, &ExtractLimits::default()).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![
                "Tenant: Harbor Yoga",
                "Landlord: Pier Nine",
                "Base Rent: $4,000",
                "Term: 60 months",
            ]
        );
    }

    #[test]
    fn runs_on_one_baseline_are_spaced() {
        let pdf = text_object(vec![
            Operation::new("Td", vec![56.into(), 736.into()]),
            show("Tenant:"),
            Operation::new("Td", vec![40.into(), 0.into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("Blue"),
                    (-250).into(),
                    Object::string_literal("Door Cof"),
                    (-20).into(),
                    Object::string_literal("fee"),
                ])],
            ),
        ]);

        let text = extract_text(&pdf, &ExtractLimits::default()).unwrap();
        assert_eq!(text, "Tenant: Blue Door Coffee");
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = extract_text(b"plain text, not a pdf", &ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn enforces_size_ceiling_before_parsing() {
        let limits = ExtractLimits {
            max_bytes: 8,
            max_pages: 10,
        };
        let err = extract_text(b"%PDF-1.5 and more", &limits).unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { size: 17, max: 8 }));
    }

    #[test]
    fn enforces_page_ceiling() {
        let limits = ExtractLimits {
            max_bytes: DEFAULT_MAX_PDF_BYTES,
            max_pages: 2,
        };
        let err = extract_text(&three_page_pdf(), &limits).unwrap_err();
        assert!(matches!(err, ExtractError::TooManyPages { pages: 3, max: 2 }));
    }

    #[tokio::test]
    async fn blocking_variant_matches() {
        let text = extract_text_blocking(three_page_pdf(), ExtractLimits::default())
            .await
            .unwrap();
        assert!(text.contains("Middle page clause"));
    }
}
