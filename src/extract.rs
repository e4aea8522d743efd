//! Extension-keyed text extraction registry.
//!
//! Each supported file format has an [`Extractor`] implementation; the
//! [`ExtractorRegistry`] maps lowercase extensions to them. An extractor
//! can report itself unavailable (legacy binary formats we cannot parse),
//! and the loader treats an unavailable extractor exactly like an
//! unsupported extension.
//!
//! The outer capability is [`ExtractorRegistry::extract_file`]: it
//! returns plain text, or an empty string on any failure — a file that
//! yields no text is skipped with a warning, never an error.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Maximum sheets processed per xlsx workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells processed per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction failure. Swallowed by [`ExtractorRegistry::extract_file`];
/// typed so extractor internals can be tested directly.
#[derive(Debug)]
pub enum ExtractError {
    Io(std::io::Error),
    Pdf(String),
    Ooxml(String),
    Unavailable(&'static str),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
            ExtractError::Unavailable(hint) => write!(f, "no parser available: {}", hint),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<std::io::Error> for ExtractError {
    fn from(e: std::io::Error) -> Self {
        ExtractError::Io(e)
    }
}

/// One per-format extraction strategy.
pub trait Extractor: Send + Sync {
    /// Lowercase extensions (without the dot) this extractor claims.
    fn extensions(&self) -> &'static [&'static str];

    /// Whether the extractor can actually run. Unavailable extractors are
    /// listed by `dossier formats` but skipped at load time.
    fn available(&self) -> bool {
        true
    }

    /// Human hint shown in the formats table.
    fn note(&self) -> &'static str;

    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

// ============ Plain text ============

struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "md", "csv", "log", "yml", "yaml", "xml"]
    }
    fn note(&self) -> &'static str {
        "read as UTF-8"
    }
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

// ============ JSON ============

/// Re-serializes JSON with indentation so keys and values become
/// line-separated, chunkable text. Invalid JSON falls back to raw text.
struct JsonExtractor;

impl Extractor for JsonExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }
    fn note(&self) -> &'static str {
        "pretty-printed"
    }
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => Ok(serde_json::to_string_pretty(&value).unwrap_or(raw)),
            Err(_) => Ok(raw),
        }
    }
}

// ============ PDF ============

struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }
    fn note(&self) -> &'static str {
        "via pdf-extract"
    }
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    }
}

// ============ OOXML (docx / pptx / xlsx) ============

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<std::io::Cursor<&[u8]>>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Collect the text content of every `<t>` element, paragraph-separated.
fn collect_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
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
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                        out.push(' ');
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Sort OOXML part names like `.../slide12.xml` by their numeric suffix.
fn sort_numbered_parts(names: &mut [String], prefix: &str, suffix: &str) {
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(suffix)
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
}

struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["docx"]
    }
    fn note(&self) -> &'static str {
        "via zip + quick-xml"
    }
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        let mut archive = open_archive(&bytes)?;
        let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
        collect_t_elements(&xml)
    }
}

struct PptxExtractor;

impl Extractor for PptxExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["pptx"]
    }
    fn note(&self) -> &'static str {
        "via zip + quick-xml"
    }
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        let mut archive = open_archive(&bytes)?;
        let mut slide_names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
            .map(|s| s.to_string())
            .collect();
        sort_numbered_parts(&mut slide_names, "ppt/slides/slide", ".xml");
        let mut out = String::new();
        for name in slide_names {
            let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
            let text = collect_t_elements(&xml)?;
            if !out.is_empty() && !text.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&text);
        }
        Ok(out)
    }
}

struct XlsxExtractor;

impl XlsxExtractor {
    fn read_shared_strings(
        archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    ) -> Result<Vec<String>, ExtractError> {
        let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
        let mut strings = Vec::new();
        let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut in_si = false;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(quick_xml::events::Event::Start(e)) => {
                    if e.local_name().as_ref() == b"si" {
                        in_si = true;
                    } else if in_si && e.local_name().as_ref() == b"t" {
                        if let Ok(quick_xml::events::Event::Text(te)) =
                            reader.read_event_into(&mut buf)
                        {
                            strings.push(te.unescape().unwrap_or_default().into_owned());
                        }
                    }
                }
                Ok(quick_xml::events::Event::End(e)) => {
                    if e.local_name().as_ref() == b"si" {
                        in_si = false;
                    }
                }
                Ok(quick_xml::events::Event::Eof) => break,
                Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
                _ => {}
            }
            buf.clear();
        }
        Ok(strings)
    }

    fn sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
        let mut cells: Vec<String> = Vec::new();
        let mut reader = quick_xml::Reader::from_reader(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut in_v = false;
        let mut cell_is_shared_str = false;
        loop {
            if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
                break;
            }
            match reader.read_event_into(&mut buf) {
                Ok(quick_xml::events::Event::Start(e)) => {
                    if e.local_name().as_ref() == b"c" {
                        cell_is_shared_str = e.attributes().any(|a| {
                            a.as_ref()
                                .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                                .unwrap_or(false)
                        });
                    } else if e.local_name().as_ref() == b"v" {
                        in_v = true;
                    }
                }
                Ok(quick_xml::events::Event::Text(te)) if in_v => {
                    let v = te.unescape().unwrap_or_default();
                    let s = v.trim();
                    if !s.is_empty() {
                        if cell_is_shared_str {
                            if let Ok(i) = s.parse::<usize>() {
                                if i < shared_strings.len() {
                                    cells.push(shared_strings[i].clone());
                                }
                            }
                        } else {
                            cells.push(s.to_string());
                        }
                    }
                    in_v = false;
                }
                Ok(quick_xml::events::Event::End(e)) => {
                    if e.local_name().as_ref() == b"v" {
                        in_v = false;
                    } else if e.local_name().as_ref() == b"c" {
                        cell_is_shared_str = false;
                    }
                }
                Ok(quick_xml::events::Event::Eof) => break,
                Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
                _ => {}
            }
            buf.clear();
        }
        Ok(cells.join(" | "))
    }
}

impl Extractor for XlsxExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["xlsx"]
    }
    fn note(&self) -> &'static str {
        "via zip + quick-xml"
    }
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        let mut archive = open_archive(&bytes)?;
        let shared_strings = Self::read_shared_strings(&mut archive).unwrap_or_default();
        let mut sheet_names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
            .map(|s| s.to_string())
            .collect();
        sort_numbered_parts(&mut sheet_names, "xl/worksheets/sheet", ".xml");
        let mut out = String::new();
        for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
            let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
            let cells = Self::sheet_cells(&xml, &shared_strings)?;
            if !out.is_empty() && !cells.is_empty() {
                out.push('\n');
            }
            out.push_str(&cells);
        }
        Ok(out)
    }
}

// ============ HTML ============

struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["html", "htm"]
    }
    fn note(&self) -> &'static str {
        "via scraper"
    }
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();
        let document = scraper::Html::parse_document(&raw);
        let mut out = String::new();
        for node in document.tree.nodes() {
            if let scraper::Node::Text(t) = node.value() {
                let parent_is_skipped = node
                    .parent()
                    .and_then(|p| p.value().as_element().map(|e| {
                        matches!(e.name(), "script" | "style")
                    }))
                    .unwrap_or(false);
                if parent_is_skipped {
                    continue;
                }
                let text = t.trim();
                if !text.is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
            }
        }
        Ok(out)
    }
}

// ============ Legacy formats — registered but unavailable ============

/// Placeholder for binary legacy formats (.doc, .xls, .odt, .rtf). Keeps
/// them visible in `dossier formats` with a conversion hint; the loader
/// skips them like any other unsupported extension.
struct LegacyOfficeExtractor;

impl Extractor for LegacyOfficeExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["doc", "xls", "odt", "rtf"]
    }
    fn available(&self) -> bool {
        false
    }
    fn note(&self) -> &'static str {
        "convert to .docx / .xlsx"
    }
    fn extract(&self, _path: &Path) -> Result<String, ExtractError> {
        Err(ExtractError::Unavailable("convert to .docx / .xlsx"))
    }
}

// ============ Registry ============

/// Availability row for the formats report.
pub struct FormatStatus {
    pub extension: &'static str,
    pub available: bool,
    pub note: &'static str,
}

/// Extension → extractor map, queried once at loader startup.
pub struct ExtractorRegistry {
    by_ext: HashMap<&'static str, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Build the registry with every built-in extractor registered.
    pub fn new() -> Self {
        let extractors: Vec<Arc<dyn Extractor>> = vec![
            Arc::new(PlainTextExtractor),
            Arc::new(JsonExtractor),
            Arc::new(PdfExtractor),
            Arc::new(DocxExtractor),
            Arc::new(PptxExtractor),
            Arc::new(XlsxExtractor),
            Arc::new(HtmlExtractor),
            Arc::new(LegacyOfficeExtractor),
        ];
        let mut by_ext = HashMap::new();
        for extractor in extractors {
            for ext in extractor.extensions() {
                by_ext.insert(*ext, Arc::clone(&extractor));
            }
        }
        Self { by_ext }
    }

    /// Whether the loader should process files with this extension.
    /// Unavailable extractors count as unsupported.
    pub fn supports(&self, extension: &str) -> bool {
        self.by_ext
            .get(extension.to_lowercase().as_str())
            .map(|e| e.available())
            .unwrap_or(false)
    }

    /// The extraction capability: text of the file, or an empty string on
    /// unsupported format or extraction failure. Never an error.
    pub fn extract_file(&self, path: &Path) -> String {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let Some(extractor) = self.by_ext.get(ext.as_str()) else {
            tracing::warn!(path = %path.display(), "unsupported format, skipping");
            return String::new();
        };
        if !extractor.available() {
            tracing::warn!(
                path = %path.display(),
                hint = extractor.note(),
                "no parser available, skipping"
            );
            return String::new();
        }
        match extractor.extract(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "extraction failed, skipping");
                String::new()
            }
        }
    }

    /// Availability table for `dossier formats`, sorted by extension.
    pub fn formats_status(&self) -> Vec<FormatStatus> {
        let mut rows: Vec<FormatStatus> = self
            .by_ext
            .iter()
            .map(|(ext, extractor)| FormatStatus {
                extension: ext,
                available: extractor.available(),
                note: extractor.note(),
            })
            .collect();
        rows.sort_by_key(|r| r.extension);
        rows
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_text_extensions_are_supported() {
        let registry = ExtractorRegistry::new();
        for ext in ["txt", "md", "csv", "json", "pdf", "docx", "pptx", "xlsx", "html"] {
            assert!(registry.supports(ext), "expected support for {ext}");
        }
    }

    #[test]
    fn legacy_formats_count_as_unsupported() {
        let registry = ExtractorRegistry::new();
        for ext in ["doc", "xls", "odt", "rtf"] {
            assert!(!registry.supports(ext), "{ext} has no parser");
        }
        assert!(!registry.supports("exe"));
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let registry = ExtractorRegistry::new();
        assert!(registry.supports("PDF"));
        assert!(registry.supports("Txt"));
    }

    #[test]
    fn extract_file_reads_plain_text() {
        let mut tmp = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(tmp, "ciao mondo").unwrap();
        let registry = ExtractorRegistry::new();
        assert_eq!(registry.extract_file(tmp.path()), "ciao mondo");
    }

    #[test]
    fn extract_file_pretty_prints_json() {
        let mut tmp = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(tmp, r#"{{"nome":"Anna","ruolo":"DPO"}}"#).unwrap();
        let registry = ExtractorRegistry::new();
        let text = registry.extract_file(tmp.path());
        assert!(text.contains("\"nome\": \"Anna\""));
    }

    #[test]
    fn extract_file_returns_empty_for_unsupported() {
        let mut tmp = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        write!(tmp, "\x00\x01").unwrap();
        let registry = ExtractorRegistry::new();
        assert_eq!(registry.extract_file(tmp.path()), "");
    }

    #[test]
    fn invalid_docx_returns_empty_not_error() {
        let mut tmp = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        write!(tmp, "not a zip archive").unwrap();
        let registry = ExtractorRegistry::new();
        assert_eq!(registry.extract_file(tmp.path()), "");
    }

    #[test]
    fn html_extraction_skips_script_and_style() {
        let mut tmp = tempfile::Builder::new().suffix(".html").tempfile().unwrap();
        write!(
            tmp,
            "<html><head><style>body {{ color: red; }}</style></head>\
             <body><p>Procedura di sicurezza</p><script>var x = 1;</script></body></html>"
        )
        .unwrap();
        let registry = ExtractorRegistry::new();
        let text = registry.extract_file(tmp.path());
        assert!(text.contains("Procedura di sicurezza"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn formats_table_lists_every_registered_extension() {
        let registry = ExtractorRegistry::new();
        let rows = registry.formats_status();
        assert!(rows.iter().any(|r| r.extension == "pdf" && r.available));
        assert!(rows.iter().any(|r| r.extension == "doc" && !r.available));
    }
}
