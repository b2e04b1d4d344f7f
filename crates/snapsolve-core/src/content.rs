//! Records flowing through the pipeline: screenshots in, structured content and
//! solutions out.

use std::path::Path;

use serde::{Deserialize, Serialize};
use snapsolve_llm::provider::ImageData;

pub const PLACEHOLDER: &str = "Not specified";

/// One captured image as handed over by the image source.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub path: String,
    pub base64_data: String,
}

impl std::fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screenshot")
            .field("path", &self.path)
            .field("data_len", &self.base64_data.len())
            .finish()
    }
}

impl Screenshot {
    #[must_use]
    pub fn new(path: impl Into<String>, base64_data: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            base64_data: base64_data.into(),
        }
    }

    /// Mime type from the file extension; PNG when unknown.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        let ext = Path::new(&self.path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "image/png",
        }
    }

    #[must_use]
    pub fn to_image(&self) -> ImageData {
        ImageData::new(self.base64_data.clone(), self.mime_type())
    }
}

/// Output of the extraction parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub problem_statement: String,
    pub constraints: String,
    pub example_input: String,
    pub example_output: String,
    /// The recovered JSON object verbatim; empty when the fallback was used.
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub fallback_used: bool,
    pub raw_text: String,
}

impl ExtractionRecord {
    /// Record built from unparseable output: the cleaned text becomes the statement.
    #[must_use]
    pub fn fallback(cleaned: &str, raw_text: &str) -> Self {
        Self {
            problem_statement: cleaned.to_owned(),
            constraints: PLACEHOLDER.into(),
            example_input: PLACEHOLDER.into(),
            example_output: PLACEHOLDER.into(),
            fields: serde_json::Map::new(),
            fallback_used: true,
            raw_text: raw_text.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    CodingTask,
    CodeReview,
    SqlTask,
    MultithreadingTask,
    Mixed,
}

impl ContentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodingTask => "coding_task",
            Self::CodeReview => "code_review",
            Self::SqlTask => "sql_task",
            Self::MultithreadingTask => "multithreading_task",
            Self::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingTask {
    pub problem_statement: String,
    pub constraints: String,
    pub example_input: String,
    pub example_output: String,
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeReview {
    /// Code found in the task text, or the whole text when none was fenced.
    pub code: String,
    pub instructions: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlTask {
    pub statement: String,
    /// Lines that look like schema definitions.
    pub schema: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentPayload {
    CodingTask(CodingTask),
    CodeReview(CodeReview),
    SqlTask(SqlTask),
    Multiple(Vec<ExtractedContent>),
}

/// Classified task content. `Multiple` appears exactly when `kind` is `Mixed`,
/// holds at least one element and never nests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub kind: ContentKind,
    pub raw_text: String,
    pub payload: ContentPayload,
    #[serde(default)]
    pub fallback_used: bool,
}

impl ExtractedContent {
    /// Sub-tasks of mixed content; empty for every other kind.
    #[must_use]
    pub fn tasks(&self) -> &[ExtractedContent] {
        match &self.payload {
            ContentPayload::Multiple(tasks) => tasks,
            _ => &[],
        }
    }

    #[must_use]
    pub fn is_mixed(&self) -> bool {
        self.kind == ContentKind::Mixed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionResult {
    pub code: String,
    pub thoughts: Vec<String>,
    pub time_complexity: String,
    pub space_complexity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentKind>,
    /// Per-task results of a mixed run, in task order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<SolutionResult>,
    #[serde(default)]
    pub fallback_used: bool,
}

/// Output of the debug stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugResult {
    #[serde(flatten)]
    pub solution: SolutionResult,
    pub issues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_from_extension() {
        assert_eq!(Screenshot::new("a/b.JPG", "").mime_type(), "image/jpeg");
        assert_eq!(Screenshot::new("shot.webp", "").mime_type(), "image/webp");
        assert_eq!(Screenshot::new("shot", "").mime_type(), "image/png");
        assert_eq!(Screenshot::new("x.png", "QUJD").to_image().data, "QUJD");
    }

    #[test]
    fn screenshot_debug_omits_payload() {
        let debug = format!("{:?}", Screenshot::new("s.png", "BIGPAYLOAD"));
        assert!(!debug.contains("BIGPAYLOAD"));
    }

    #[test]
    fn solution_serializes_snake_case() {
        let json = serde_json::to_value(SolutionResult {
            code: "x".into(),
            time_complexity: "O(n)".into(),
            space_complexity: "O(1)".into(),
            ..SolutionResult::default()
        })
        .unwrap();
        assert_eq!(json["time_complexity"], "O(n)");
        assert!(json.get("tasks").is_none());
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn debug_result_flattens_solution() {
        let json = serde_json::to_value(DebugResult {
            solution: SolutionResult {
                code: "fixed".into(),
                ..SolutionResult::default()
            },
            issues: vec!["off by one".into()],
        })
        .unwrap();
        assert_eq!(json["code"], "fixed");
        assert_eq!(json["issues"][0], "off by one");
    }

    #[test]
    fn kind_display() {
        assert_eq!(ContentKind::MultithreadingTask.to_string(), "multithreading_task");
    }
}
