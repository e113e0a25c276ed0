//! Loading text and markdown files into the document store.

use std::path::Path;

use anyhow::Context as _;
use loyer_core::document::{AffairKey, SourceDocument};

/// Form feed, the page break emitted by the layout extractor.
const PAGE_BREAK: char = '\u{c}';

/// Lowercase ASCII slug of a file stem: runs of anything but letters and
/// digits collapse to a single `-`.
pub fn slug(stem: &str) -> String {
  let mut out = String::with_capacity(stem.len());
  for c in stem.chars().flat_map(char::to_lowercase) {
    let c = match c {
      'à' | 'â' | 'ä' | 'á' => 'a',
      'é' | 'è' | 'ê' | 'ë' => 'e',
      'î' | 'ï' | 'í' => 'i',
      'ô' | 'ö' | 'ó' => 'o',
      'ù' | 'û' | 'ü' | 'ú' => 'u',
      'ç' => 'c',
      c => c,
    };
    if c.is_ascii_alphanumeric() {
      out.push(c);
    } else if !out.is_empty() && !out.ends_with('-') {
      out.push('-');
    }
  }
  out.trim_end_matches('-').to_string()
}

/// Read one extracted document of `affair` from `path`.
pub fn load(affair: &AffairKey, path: &Path) -> anyhow::Result<SourceDocument> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read {}", path.display()))?;
  let stem = path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .with_context(|| format!("{} has no file name", path.display()))?;
  let title = path
    .file_name()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| stem.clone());
  let page_count = u32::try_from(content.matches(PAGE_BREAK).count() + 1).unwrap_or(u32::MAX);

  Ok(SourceDocument {
    document_id: slug(&stem),
    affair: affair.clone(),
    title,
    content,
    page_count,
    language: None,
  })
}
