//! Multi-format text extraction for uploaded documents.
//!
//! Routing is driven by the declared file-type label, not by sniffing:
//! `pdf` and `docx`/`doc` get format-specific extraction, everything else
//! (`txt`, `text`, `md`, `markdown`, unknown labels) is decoded as UTF-8
//! text verbatim. Extraction failures are wrapped into
//! [`KbError::DocumentParsing`] and are fatal for that upload; no fallback
//! re-parsing is attempted.

use std::io::Read;

use crate::error::{KbError, Result};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extract plain text from an uploaded byte buffer with a declared type label.
pub fn parse_document(bytes: &[u8], file_type: &str) -> Result<String> {
    match file_type.to_ascii_lowercase().as_str() {
        "pdf" => parse_pdf(bytes),
        "docx" | "doc" => parse_docx(bytes),
        // txt, text, md, markdown, and anything unrecognized: plain text
        _ => Ok(parse_text(bytes)),
    }
}

fn parse_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| KbError::DocumentParsing(format!("PDF extraction failed: {}", e)))
}

fn parse_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn parse_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| KbError::DocumentParsing(format!("DOCX extraction failed: {}", e)))?;

    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| KbError::DocumentParsing(format!("DOCX extraction failed: {}", e)))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| KbError::DocumentParsing(format!("DOCX extraction failed: {}", e)))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(KbError::DocumentParsing(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(KbError::DocumentParsing(
            "DOCX extraction failed: word/document.xml not found".to_string(),
        ));
    }

    extract_text_runs(&doc_xml)
}

/// Stream `<w:t>` text runs out of `word/document.xml`.
fn extract_text_runs(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(KbError::DocumentParsing(format!(
                    "DOCX extraction failed: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
