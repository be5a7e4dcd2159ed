use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::booking::{self, BookingRecord, Cell};
use crate::error::ArtifactLoadError;

/// Turns a booking into the numeric features the classifier was trained on.
pub trait Encoder: Send + Sync {
    fn transform(&self, record: &BookingRecord) -> Result<Vec<f32>>;

    /// Length of every vector `transform` returns.
    fn width(&self) -> usize;
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    #[default]
    Error,
    Ignore,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Step {
    StandardScaler {
        columns: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    OneHot {
        columns: Vec<String>,
        categories: Vec<Vec<String>>,
        #[serde(default)]
        handle_unknown: HandleUnknown,
    },
    Passthrough {
        columns: Vec<String>,
    },
}

impl Step {
    fn columns(&self) -> &[String] {
        match self {
            Self::StandardScaler { columns, .. }
            | Self::OneHot { columns, .. }
            | Self::Passthrough { columns } => columns,
        }
    }

    fn width(&self) -> usize {
        match self {
            Self::StandardScaler { columns, .. } | Self::Passthrough { columns } => columns.len(),
            Self::OneHot { categories, .. } => categories.iter().map(Vec::len).sum(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        for column in self.columns() {
            let spec = booking::field(column).ok_or_else(|| format!("unknown column `{column}`"))?;
            if spec.is_categorical() && !matches!(self, Self::OneHot { .. }) {
                return Err(format!("column `{column}` is categorical"));
            }
        }
        match self {
            Self::StandardScaler {
                columns,
                mean,
                scale,
            } => {
                if mean.len() != columns.len() || scale.len() != columns.len() {
                    return Err(format!(
                        "standard_scaler has {} columns, {} means and {} scales",
                        columns.len(),
                        mean.len(),
                        scale.len()
                    ));
                }
                if mean.iter().any(|m| !m.is_finite()) {
                    return Err("standard_scaler mean must be finite".to_string());
                }
                if scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
                    return Err("standard_scaler scale must be finite and non-zero".to_string());
                }
            }
            Self::OneHot {
                columns,
                categories,
                ..
            } => {
                if categories.len() != columns.len() {
                    return Err(format!(
                        "one_hot has {} columns and {} category lists",
                        columns.len(),
                        categories.len()
                    ));
                }
                if let Some((column, _)) = columns.iter().zip(categories).find(|(_, c)| c.is_empty()) {
                    return Err(format!("column `{column}` has no categories"));
                }
            }
            Self::Passthrough { .. } => {}
        }
        Ok(())
    }

    fn apply(&self, record: &BookingRecord, out: &mut Vec<f32>) -> Result<()> {
        match self {
            Self::StandardScaler {
                columns,
                mean,
                scale,
            } => {
                for ((column, mean), scale) in columns.iter().zip(mean).zip(scale) {
                    let x = number(record, column)?;
                    out.push(((x - mean) / scale) as f32);
                }
            }
            Self::Passthrough { columns } => {
                for column in columns {
                    out.push(number(record, column)? as f32);
                }
            }
            Self::OneHot {
                columns,
                categories,
                handle_unknown,
            } => {
                for (column, categories) in columns.iter().zip(categories) {
                    let Some(cell) = record.cell(column) else {
                        bail!("record has no column `{column}`");
                    };
                    let value = cell.to_string();
                    let hit = categories.iter().position(|c| *c == value);
                    if hit.is_none() && *handle_unknown == HandleUnknown::Error {
                        bail!("found unknown category `{value}` in column `{column}`");
                    }
                    out.extend((0..categories.len()).map(|i| if hit == Some(i) { 1.0 } else { 0.0 }));
                }
            }
        }
        Ok(())
    }
}

fn number(record: &BookingRecord, column: &str) -> Result<f64> {
    match record.cell(column) {
        Some(Cell::Number(x)) => Ok(x),
        Some(Cell::Text(_)) => bail!("column `{column}` is not numeric"),
        None => bail!("record has no column `{column}`"),
    }
}

#[derive(Debug, Deserialize)]
struct PreprocessorFile {
    steps: Vec<Step>,
}

/// A fitted column transformer exported as JSON.
///
/// Each step writes a contiguous block of the feature vector, in the order
/// the steps are listed.
#[derive(Debug)]
pub struct Preprocessor {
    steps: Vec<Step>,
    width: usize,
}

impl Preprocessor {
    pub fn load(path: &Path) -> std::result::Result<Self, ArtifactLoadError> {
        let text = fs::read_to_string(path).map_err(|source| ArtifactLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|reason| ArtifactLoadError::Encoder {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn from_json(text: &str) -> std::result::Result<Self, String> {
        let file: PreprocessorFile = serde_json::from_str(text).map_err(|e| e.to_string())?;
        if file.steps.is_empty() {
            return Err("no steps".to_string());
        }
        for step in &file.steps {
            step.validate()?;
        }
        let width = file.steps.iter().map(Step::width).sum();
        Ok(Self {
            steps: file.steps,
            width,
        })
    }
}

impl Encoder for Preprocessor {
    fn transform(&self, record: &BookingRecord) -> Result<Vec<f32>> {
        let mut features = Vec::with_capacity(self.width);
        for step in &self.steps {
            step.apply(record, &mut features)?;
        }
        Ok(features)
    }

    fn width(&self) -> usize {
        self.width
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;
    use crate::booking::default_raw;

    const ARTIFACT: &str = r#"{
        "steps": [
            {
                "kind": "standard_scaler",
                "columns": ["lead_time", "adr"],
                "mean": [100.0, 80.0],
                "scale": [50.0, 40.0]
            },
            {
                "kind": "one_hot",
                "columns": ["hotel", "arrival_date_month"],
                "categories": [["City Hotel", "Resort Hotel"], ["1", "2", "3"]]
            },
            {
                "kind": "passthrough",
                "columns": ["is_repeated_guest"]
            }
        ]
    }"#;

    fn record() -> BookingRecord {
        BookingRecord::from_raw(&default_raw()).unwrap()
    }

    #[test]
    fn transform_in_step_order() {
        let encoder = Preprocessor::from_json(ARTIFACT).unwrap();
        assert_eq!(encoder.width(), 8);

        let features = encoder.transform(&record()).unwrap();
        assert_eq!(features, vec![-1.0, 0.5, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn transform_is_deterministic() {
        let encoder = Preprocessor::from_json(ARTIFACT).unwrap();
        let record = record();
        assert_eq!(
            encoder.transform(&record).unwrap(),
            encoder.transform(&record).unwrap()
        );
    }

    #[test]
    fn unknown_category_errors_by_default() {
        let encoder = Preprocessor::from_json(ARTIFACT).unwrap();
        let mut raw = default_raw();
        raw.insert("arrival_date_month".to_string(), json!(7));
        let record = BookingRecord::from_raw(&raw).unwrap();

        let err = encoder.transform(&record).unwrap_err();
        assert!(err.to_string().contains("unknown category `7`"));
    }

    #[test]
    fn unknown_category_ignored() {
        let artifact = json!({
            "steps": [{
                "kind": "one_hot",
                "columns": ["meal"],
                "categories": [["FB", "HB"]],
                "handle_unknown": "ignore"
            }]
        });
        let encoder = Preprocessor::from_json(&artifact.to_string()).unwrap();
        assert_eq!(encoder.transform(&record()).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn rejects_invalid_artifacts() {
        let cases = [
            (json!({ "steps": [] }), "no steps"),
            (
                json!({ "steps": [{ "kind": "passthrough", "columns": ["rooms"] }] }),
                "unknown column `rooms`",
            ),
            (
                json!({ "steps": [{ "kind": "passthrough", "columns": ["meal"] }] }),
                "column `meal` is categorical",
            ),
            (
                json!({ "steps": [{
                    "kind": "standard_scaler",
                    "columns": ["adr"],
                    "mean": [1.0],
                    "scale": [0.0]
                }] }),
                "non-zero",
            ),
            (
                json!({ "steps": [{
                    "kind": "standard_scaler",
                    "columns": ["adr", "adults"],
                    "mean": [1.0],
                    "scale": [1.0, 1.0]
                }] }),
                "2 columns, 1 means",
            ),
            (
                json!({ "steps": [{
                    "kind": "one_hot",
                    "columns": ["hotel"],
                    "categories": [[]]
                }] }),
                "no categories",
            ),
            (
                json!({ "steps": [{ "kind": "ordinal", "columns": ["hotel"] }] }),
                "unknown variant",
            ),
        ];
        for (artifact, expected) in cases {
            let err = Preprocessor::from_json(&artifact.to_string()).unwrap_err();
            assert!(err.contains(expected), "`{err}` should mention `{expected}`");
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ARTIFACT.as_bytes()).unwrap();
        let encoder = Preprocessor::load(file.path()).unwrap();
        assert_eq!(encoder.width(), 8);
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("preprocessor.json");
        assert!(matches!(
            Preprocessor::load(&missing),
            Err(ArtifactLoadError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        assert!(matches!(
            Preprocessor::load(file.path()),
            Err(ArtifactLoadError::Encoder { .. })
        ));
    }
}
