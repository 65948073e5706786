//! Path and filename helpers shared by the converter and the CLI.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Validate that a path points at an existing PDF file.
pub fn validate_pdf(path: &Path) -> Result<&Path> {
    if !path.exists() {
        return Err(Error::PdfExtraction(format!(
            "PDF file not found: {}",
            path.display()
        )));
    }
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(Error::PdfExtraction(format!(
            "File is not a PDF: {}",
            path.display()
        )));
    }
    Ok(path)
}

/// Derive the output path, creating parent directories.
///
/// Defaults to the input path with its extension replaced.
pub fn ensure_output_path(
    input: &Path,
    output: Option<&Path>,
    extension: &str,
) -> Result<PathBuf> {
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => input.with_extension(extension),
    };
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(output)
}

/// Guess title and author from a PDF filename.
///
/// Filenames shaped like `"Author - Title.pdf"` split into both fields;
/// anything else becomes the title with an unknown author.
pub fn metadata_from_filename(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string());

    if let Some((author, title)) = stem.split_once(" - ") {
        let author = author.trim();
        let title = title.trim();
        if !author.is_empty() && !title.is_empty() {
            return (title.to_string(), author.to_string());
        }
    }
    (stem, "Unknown".to_string())
}

/// Format a byte count as a human-readable size (e.g. "1.5 MB").
pub fn format_file_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

/// Get a time-based seed value for pseudo-random identifier generation.
pub fn time_seed_nanos() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(12345)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_filename_split() {
        let (title, author) = metadata_from_filename(Path::new("Ada Lovelace - Notes.pdf"));
        assert_eq!(title, "Notes");
        assert_eq!(author, "Ada Lovelace");
    }

    #[test]
    fn test_metadata_from_filename_plain() {
        let (title, author) = metadata_from_filename(Path::new("attention_is_all_you_need.pdf"));
        assert_eq!(title, "attention_is_all_you_need");
        assert_eq!(author, "Unknown");
    }

    #[test]
    fn test_metadata_from_filename_degenerate_dash() {
        // A leading dash separator should not produce an empty author.
        let (title, author) = metadata_from_filename(Path::new(" - Title.pdf"));
        assert_eq!(title, " - Title");
        assert_eq!(author, "Unknown");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_validate_pdf_rejects_missing() {
        assert!(validate_pdf(Path::new("/nonexistent/paper.pdf")).is_err());
    }

    #[test]
    fn test_validate_pdf_rejects_wrong_extension() {
        let file = tempfile::NamedTempFile::with_suffix(".txt").unwrap();
        assert!(validate_pdf(file.path()).is_err());
    }

    #[test]
    fn test_ensure_output_path_default() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("paper.pdf");
        let output = ensure_output_path(&input, None, "epub").unwrap();
        assert_eq!(output, dir.path().join("paper.epub"));
    }

    #[test]
    fn test_ensure_output_path_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("paper.pdf");
        let nested = dir.path().join("out/deep/paper.epub");
        let output = ensure_output_path(&input, Some(&nested), "epub").unwrap();
        assert_eq!(output, nested);
        assert!(output.parent().unwrap().exists());
    }
}
