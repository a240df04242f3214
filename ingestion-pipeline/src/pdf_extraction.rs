//! The PDF text extractor: an external collaborator specified only by its `bytes -> text`
//! interface (§1). `PdfExtractTextExtractor` is the one production implementation, grounded on
//! the teacher's `pdf-extract` usage in `ingestion-pipeline/src/utils/pdf_ingestion.rs`'s fast
//! path (the vision fallback for scanned PDFs is out of scope here, see `SPEC_FULL.md` §C.4).

use std::path::Path;

use async_trait::async_trait;
use common::error::AppError;

#[async_trait]
pub trait PdfExtractor: Send + Sync {
    /// Extracts all text from a PDF file. Returns `Ok("")` rather than an error when the
    /// file parses but has no text layer; `IngestionPipeline` is responsible for treating
    /// "no non-whitespace text" as a `no content` failure (§4.4 step 1).
    async fn extract_text(&self, path: &Path) -> Result<String, AppError>;
}

#[derive(Default)]
pub struct PdfExtractTextExtractor;

#[async_trait]
impl PdfExtractor for PdfExtractTextExtractor {
    async fn extract_text(&self, path: &Path) -> Result<String, AppError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text(&path)
                .map_err(|err| AppError::Processing(format!("pdf extraction failed: {err}")))
        })
        .await?
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::{AppError, PdfExtractor};
    use async_trait::async_trait;
    use std::{collections::HashMap, path::Path, sync::Mutex};

    /// Returns pre-seeded text keyed by file path string, for tests that don't want to
    /// construct real PDF bytes.
    #[derive(Default)]
    pub struct FakePdfExtractor {
        pages: Mutex<HashMap<String, String>>,
    }

    impl FakePdfExtractor {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, path: impl Into<String>, text: impl Into<String>) {
            self.pages.lock().unwrap().insert(path.into(), text.into());
        }
    }

    #[async_trait]
    impl PdfExtractor for FakePdfExtractor {
        async fn extract_text(&self, path: &Path) -> Result<String, AppError> {
            let key = path.to_string_lossy().to_string();
            Ok(self.pages.lock().unwrap().get(&key).cloned().unwrap_or_default())
        }
    }
}
