//! Turning uploaded course files into `(text, metadata)` records.
//!
//! Plain text becomes a single record. PDFs become one record per page, decoded
//! through a [`PdfDecoder`] so the PDF backend can be swapped (or faked in tests).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Where a piece of text came from. Carried unchanged from document to chunk to store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Path of the originating file, as given to the loader.
    pub source: String,
    /// 1-based page number for paged formats (PDF); `None` for plain text.
    pub page: Option<u32>,
}

/// One loaded record: a whole text file, or one PDF page.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
}

impl DocumentFormat {
    /// Detects the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" | "md" | "markdown" => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// Extracts the text of each page of a PDF, in page order.
pub trait PdfDecoder: Send + Sync {
    fn pages(&self, path: &Path) -> Result<Vec<String>, LoadError>;
}

/// [`PdfDecoder`] backed by the `pdf-extract` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtract;

impl PdfDecoder for PdfExtract {
    fn pages(&self, path: &Path) -> Result<Vec<String>, LoadError> {
        pdf_extract::extract_text_by_pages(path)
            .map_err(|e| LoadError::Pdf(path.to_path_buf(), e.to_string()))
    }
}

/// Anything that can turn a file path into document records.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<Document>, LoadError>;
}

/// Loads PDFs and plain text from the local filesystem.
pub struct FileLoader {
    pdf: Box<dyn PdfDecoder>,
}

impl FileLoader {
    pub fn new() -> Self {
        Self {
            pdf: Box::new(PdfExtract),
        }
    }

    /// Use a different PDF backend.
    pub fn with_pdf_decoder(mut self, decoder: impl PdfDecoder + 'static) -> Self {
        self.pdf = Box::new(decoder);
        self
    }
}

impl Default for FileLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<Vec<Document>, LoadError> {
        let format = DocumentFormat::from_path(path)
            .ok_or_else(|| LoadError::UnsupportedFormat(path.to_path_buf()))?;
        let source = path.to_string_lossy().into_owned();
        match format {
            DocumentFormat::PlainText => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| LoadError::Read(path.to_path_buf(), e))?;
                Ok(vec![Document {
                    text,
                    metadata: Metadata { source, page: None },
                }])
            }
            DocumentFormat::Pdf => {
                if !path.is_file() {
                    return Err(LoadError::Read(
                        path.to_path_buf(),
                        std::io::Error::from(std::io::ErrorKind::NotFound),
                    ));
                }
                let pages = self.pdf.pages(path)?;
                Ok(pages
                    .into_iter()
                    .zip(1u32..)
                    .map(|(text, page)| Document {
                        text,
                        metadata: Metadata {
                            source: source.clone(),
                            page: Some(page),
                        },
                    })
                    .collect())
            }
        }
    }
}

/// Lists every file under `root` whose format we can load, sorted by path.
/// Hidden entries are skipped and symlinks into directories are not followed.
pub fn scan_materials(root: &Path) -> Result<Vec<PathBuf>, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::NotADirectory(root.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| LoadError::Walk(e.to_string()))?;
        let path = entry.path();
        if entry.file_type().is_file() && DocumentFormat::from_path(path).is_some() {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("could not decode PDF {0}: {1}")]
    Pdf(PathBuf, String),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
}
