//! Built-in validator applying checks common to every challenge.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::submission::ValidationOutcome;

use super::types::{ScriptError, ValidationRequest, Validator};

/// Rejects failed runs, missing or empty predictions, and CSV files lacking
/// required header columns.
#[derive(Debug, Clone, Default)]
pub struct GenericValidator {
    required_columns: Vec<String>,
}

impl GenericValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_required_columns(mut self, columns: Vec<String>) -> Self {
        self.required_columns = columns;
        self
    }

    async fn check_columns(&self, file: &Path, errors: &mut Vec<String>) -> Result<(), ScriptError> {
        let is_csv = file
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if self.required_columns.is_empty() || !is_csv {
            return Ok(());
        }

        let Some(line) = read_header(file).await? else {
            errors.push("predictions file is not valid UTF-8".to_string());
            return Ok(());
        };
        let header: Vec<&str> = line
            .trim_end_matches(['\r', '\n'])
            .split(',')
            .map(|c| c.trim().trim_matches('"'))
            .collect();

        for column in &self.required_columns {
            if !header.contains(&column.as_str()) {
                errors.push(format!("missing column {}", column));
            }
        }
        Ok(())
    }
}

/// Header lines longer than this are cut off.
const MAX_HEADER_BYTES: u64 = 64 * 1024;

/// Reads the first line only. `None` when it is not UTF-8.
async fn read_header(file: &Path) -> Result<Option<String>, ScriptError> {
    let file = tokio::fs::File::open(file).await?;
    let mut reader = BufReader::new(file.take(MAX_HEADER_BYTES));
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;
    Ok(String::from_utf8(line).ok())
}

/// Resolves the predictions file: the path itself, or the first file (by
/// name) inside an output directory. `None` when there is no such file.
pub async fn resolve_predictions(path: &Path) -> Result<Option<PathBuf>, ScriptError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if metadata.is_file() {
        return Ok(Some(path.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files.into_iter().next())
}

#[async_trait]
impl Validator for GenericValidator {
    fn name(&self) -> &str {
        "generic"
    }

    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationOutcome, ScriptError> {
        let mut errors = Vec::new();

        if let Some(code) = request.exit_code.filter(|c| *c != 0) {
            errors.push(format!("container exited with code {}", code));
        }

        match resolve_predictions(&request.predictions).await? {
            None => errors.push("no predictions file found".to_string()),
            Some(file) => {
                if tokio::fs::metadata(&file).await?.len() == 0 {
                    errors.push("predictions file is empty".to_string());
                } else {
                    self.check_columns(&file, &mut errors).await?;
                }
            }
        }

        Ok(if errors.is_empty() {
            ValidationOutcome::valid()
        } else {
            ValidationOutcome::invalid(errors)
        })
    }
}
