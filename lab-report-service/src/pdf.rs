//! PDF → plain text, tolerating broken pages.

use anyhow::anyhow;
use lopdf::Document;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{info, warn};

/// Text of each page, in page order. A page that cannot be read is an `Err`.
pub type PageTexts = Vec<anyhow::Result<String>>;

/// Generic PDF library seam: open a document and read its pages one by one.
pub trait PdfReader: Send + Sync {
    /// Fails only when the container itself cannot be opened.
    fn read(&self, bytes: &[u8]) -> anyhow::Result<PageTexts>;
}

/// [`PdfReader`] backed by `lopdf`
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfReader;

impl PdfReader for LopdfReader {
    fn read(&self, bytes: &[u8]) -> anyhow::Result<PageTexts> {
        let document = Document::load_mem(bytes).map_err(|e| anyhow!("Failed to load PDF: {}", e))?;

        let pages = document
            .get_pages()
            .into_keys()
            .map(|page_number| {
                // lopdf can panic on hostile content streams; treat that as a bad page
                catch_unwind(AssertUnwindSafe(|| document.extract_text(&[page_number])))
                    .map_err(|_| anyhow!("PDF parser panicked on page {}", page_number))?
                    .map_err(|e| anyhow!("Failed to extract page {}: {}", page_number, e))
            })
            .collect();

        Ok(pages)
    }
}

/// Concatenate the text of every readable page.
///
/// Never fails: unreadable pages contribute nothing and an unreadable document
/// yields an empty string, which the caller treats as an extraction failure.
pub fn extract_text(reader: &dyn PdfReader, bytes: &[u8]) -> String {
    let pages = match reader.read(bytes) {
        Ok(pages) => pages,
        Err(e) => {
            warn!(error = %e, "PDF extraction error");
            return String::new();
        }
    };

    let page_count = pages.len();
    let mut text = String::new();
    let mut failed_pages = 0usize;

    for (index, page) in pages.into_iter().enumerate() {
        match page {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => {
                failed_pages += 1;
                warn!(page = index + 1, error = %e, "Skipping unreadable PDF page");
            }
        }
    }

    info!(
        pages = page_count,
        failed_pages,
        characters = text.chars().count(),
        "Extracted text from PDF"
    );
    text
}
