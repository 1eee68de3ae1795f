//! Text extraction: PDF text layer first, OCR of the first page as fallback.
//!
//! The default engine shells out to poppler (`pdftotext`, `pdftoppm`) and
//! `tesseract`. Program names come from the `[extract]` config section.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::mailtext_config::{self, ExtractConfig};
use crate::sync::types::ArtifactKind;
use crate::util::run_cmd;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("file not found: {0}")]
    MissingFile(PathBuf),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with code {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not extract text from the PDF, not even with OCR: {0}")]
    OcrFallback(Box<ExtractError>),
}

/// Converts one stored artifact into text. May be slow (seconds).
pub trait ExtractionEngine {
    fn extract(&mut self, path: &Path, kind: ArtifactKind) -> Result<String, ExtractError>;
}

/// Text written in place of extraction output when the engine fails.
pub fn failure_text(path: &Path, err: &ExtractError) -> String {
    format!("Error extracting text from {}: {}", path.display(), err)
}

#[derive(Debug, Clone)]
pub struct CommandExtractor {
    config: ExtractConfig,
}

impl CommandExtractor {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    fn run_checked(&self, program: &str, args: &[&std::ffi::OsStr]) -> Result<String, ExtractError> {
        debug!("Running {} {:?}", program, args);
        let out = run_cmd(program, args).map_err(|source| ExtractError::Spawn {
            program: program.to_string(),
            source,
        })?;
        if !out.success() {
            return Err(ExtractError::Failed {
                program: program.to_string(),
                code: out.code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout)
    }

    fn pdf_text_layer(&self, path: &Path) -> Result<String, ExtractError> {
        self.run_checked(
            &self.config.pdftotext,
            &["-layout".as_ref(), path.as_os_str(), "-".as_ref()],
        )
    }

    fn ocr(&self, image: &Path) -> Result<String, ExtractError> {
        self.run_checked(
            &self.config.tesseract,
            &[
                image.as_os_str(),
                "stdout".as_ref(),
                "-l".as_ref(),
                self.config.languages.as_ref(),
            ],
        )
    }

    /// Render page 1 to PNG in a temp dir and OCR it.
    fn ocr_first_page(&self, path: &Path) -> Result<String, ExtractError> {
        let dir = tempfile::TempDir::new()?;
        let prefix = dir.path().join("page");
        self.run_checked(
            &self.config.pdftoppm,
            &[
                "-f".as_ref(),
                "1".as_ref(),
                "-l".as_ref(),
                "1".as_ref(),
                "-singlefile".as_ref(),
                "-png".as_ref(),
                "-r".as_ref(),
                "300".as_ref(),
                path.as_os_str(),
                prefix.as_os_str(),
            ],
        )?;
        let image = dir.path().join("page.png");
        if !image.exists() {
            return Err(ExtractError::MissingFile(image));
        }
        self.ocr(&image)
    }
}

impl ExtractionEngine for CommandExtractor {
    fn extract(&mut self, path: &Path, kind: ArtifactKind) -> Result<String, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::MissingFile(path.to_path_buf()));
        }
        match kind {
            ArtifactKind::Image => self.ocr(path),
            ArtifactKind::Pdf => {
                match self.pdf_text_layer(path) {
                    Ok(text) if !text.trim().is_empty() => return Ok(text),
                    Ok(_) => debug!("{}: empty text layer, falling back to OCR", path.display()),
                    Err(e) => debug!("{}: text layer failed ({}), falling back to OCR", path.display(), e),
                }
                self.ocr_first_page(path)
                    .map_err(|e| ExtractError::OcrFallback(Box::new(e)))
            }
        }
    }
}

/// mailtext extract FILE
pub fn run(file: &Path) -> Result<()> {
    let config = mailtext_config::try_load_config(None).unwrap_or_default();
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let Some(kind) = ArtifactKind::from_filename(&name) else {
        bail!(
            "Unsupported file type: {} (expected .pdf, .jpg, .jpeg or .png)",
            file.display()
        );
    };
    let mut engine = CommandExtractor::new(config.extract);
    info!("Extracting {}", file.display());
    let text = engine.extract(file, kind)?;
    println!("{}", text);
    Ok(())
}
