//! Keyword-based task classification.
//!
//! Categories overlap on surface features, so the checks run in a fixed priority
//! order and the first hit wins: review, SQL, concurrency, numbered tasks, coding.

use std::sync::LazyLock;

use regex::Regex;

use crate::content::{
    CodeReview, CodingTask, ContentKind, ContentPayload, ExtractedContent, ExtractionRecord,
    PLACEHOLDER, SqlTask,
};

static REVIEW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:review|refactor|fix)(?:s|es|ing)?\b|code\s+smell|ревью|рефактор|исправ|@(?:Autowired|Inject|Component|Service|Bean|Controller|Repository)\b",
    )
    .unwrap()
});

static SQL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bselect\b|\bjoin\b|create\s+table|primary\s+key|foreign\s+key|group\s+by|таблиц|запрос",
    )
    .unwrap()
});

static CONCURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)multi-?thread|concurren|parallel|многопоточ|параллел|потокобезопас").unwrap()
});

static TASK_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:task|problem|задача|задание)\s*(?:№|#)?\s*\d+").unwrap()
});

static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\d|divisible\s+by|less\s+than|greater\s+than|at\s+least|at\s+most|делится\s+на|меньше|больше|не\s+менее|не\s+более",
    )
    .unwrap()
});

static SCHEMA_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)create\s+table|primary\s+key|foreign\s+key|references|таблиц").unwrap()
});

static FENCED_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n]*\n(.*?)```").unwrap());

/// Classify free text. Never fails; unmatched text is a `coding_task`.
#[must_use]
pub fn classify(text: &str) -> ExtractedContent {
    classify_with(text, true)
}

/// Split on numbered task markers, classifying each span without the numbered rule.
///
/// Each marker starts a span that runs to the next marker. Text without markers
/// yields one element covering all of it.
#[must_use]
pub fn split_into_tasks(text: &str) -> Vec<ExtractedContent> {
    let starts: Vec<usize> = TASK_MARKER_RE.find_iter(text).map(|m| m.start()).collect();
    if starts.is_empty() {
        return vec![classify_with(text, false)];
    }
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            classify_with(text[start..end].trim(), false)
        })
        .collect()
}

/// Lines mentioning numbers or comparisons, verbatim.
#[must_use]
pub fn extract_requirements(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && REQUIREMENT_RE.is_match(line))
        .map(str::to_owned)
        .collect()
}

/// Classify an extraction record, filling coding payloads from its fields.
///
/// `raw_text` of the result is the text that was classified; the model reply stays
/// on the record.
#[must_use]
pub fn classify_extraction(record: &ExtractionRecord) -> ExtractedContent {
    let text = classification_text(record);
    let mut content = classify(&text);
    content.fallback_used = record.fallback_used;

    if let ContentPayload::CodingTask(task) = &mut content.payload
        && !record.fallback_used
    {
        task.problem_statement.clone_from(&record.problem_statement);
        task.constraints.clone_from(&record.constraints);
        task.example_input.clone_from(&record.example_input);
        task.example_output.clone_from(&record.example_output);
        task.requirements = extract_requirements(&text);
    }
    content
}

fn classification_text(record: &ExtractionRecord) -> String {
    if record.fallback_used {
        return record.problem_statement.clone();
    }
    [
        record.problem_statement.as_str(),
        record.constraints.as_str(),
    ]
    .into_iter()
    .filter(|s| !s.trim().is_empty() && *s != PLACEHOLDER)
    .collect::<Vec<_>>()
    .join("\n")
}

fn classify_with(text: &str, allow_split: bool) -> ExtractedContent {
    let kind = if REVIEW_RE.is_match(text) {
        ContentKind::CodeReview
    } else if SQL_RE.is_match(text) {
        ContentKind::SqlTask
    } else if CONCURRENCY_RE.is_match(text) {
        ContentKind::MultithreadingTask
    } else if allow_split && TASK_MARKER_RE.find_iter(text).nth(1).is_some() {
        ContentKind::Mixed
    } else {
        ContentKind::CodingTask
    };

    let payload = match kind {
        ContentKind::Mixed => ContentPayload::Multiple(split_into_tasks(text)),
        ContentKind::CodeReview => ContentPayload::CodeReview(review_payload(text)),
        ContentKind::SqlTask => ContentPayload::SqlTask(SqlTask {
            statement: text.trim().to_owned(),
            schema: text
                .lines()
                .map(str::trim)
                .filter(|l| SCHEMA_LINE_RE.is_match(l))
                .map(str::to_owned)
                .collect(),
        }),
        ContentKind::CodingTask | ContentKind::MultithreadingTask => {
            ContentPayload::CodingTask(CodingTask {
                problem_statement: text.trim().to_owned(),
                requirements: extract_requirements(text),
                ..CodingTask::default()
            })
        }
    };

    ExtractedContent {
        kind,
        raw_text: text.to_owned(),
        payload,
        fallback_used: false,
    }
}

fn review_payload(text: &str) -> CodeReview {
    let blocks: Vec<&str> = FENCED_CODE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end())
        .collect();
    if blocks.is_empty() {
        CodeReview {
            code: text.trim().to_owned(),
            instructions: String::new(),
        }
    } else {
        CodeReview {
            code: blocks.join("\n\n"),
            instructions: FENCED_CODE_RE.replace_all(text, "").trim().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn two_russian_tasks_are_mixed() {
        let content = classify("Задача 1: найти сумму чисел. Задача 2: развернуть строку.");
        assert_eq!(content.kind, ContentKind::Mixed);
        assert_eq!(content.tasks().len(), 2);
        assert!(content.tasks().iter().all(|t| !t.is_mixed()));
    }

    #[test]
    fn single_marker_is_not_mixed() {
        let content = classify("Task 1: return the maximum element of an array.");
        assert_eq!(content.kind, ContentKind::CodingTask);
    }

    #[test]
    fn review_beats_sql() {
        let content = classify("Please review this query: SELECT * FROM users JOIN orders");
        assert_eq!(content.kind, ContentKind::CodeReview);
    }

    #[test]
    fn di_annotation_is_review() {
        let content = classify("class A {\n  @Autowired\n  private Repo repo;\n}");
        assert_eq!(content.kind, ContentKind::CodeReview);
    }

    #[test]
    fn prefix_is_not_fix() {
        let content = classify("Find the longest common prefix of the strings.");
        assert_eq!(content.kind, ContentKind::CodingTask);
    }

    #[test]
    fn fixed_is_not_fix() {
        let content = classify(
            "Given an array and a fixed window size k, return the maximum sum of any window.",
        );
        assert_eq!(content.kind, ContentKind::CodingTask);
        assert_eq!(classify("Use a test fixture").kind, ContentKind::CodingTask);
        assert_eq!(classify("Reviewer notes: none").kind, ContentKind::CodingTask);
        assert_eq!(classify("Fix the bug below").kind, ContentKind::CodeReview);
        assert_eq!(classify("Refactoring this class").kind, ContentKind::CodeReview);
    }

    #[test]
    fn reply_prose_does_not_leak_into_raw_text() {
        let record = crate::normalizer::parse_extraction(
            r#"I fixed the OCR artifacts. {"problem_statement":"Return the sum of an array","constraints":"n <= 10"}"#,
        );
        let content = classify_extraction(&record);
        assert_eq!(content.kind, ContentKind::CodingTask);
        assert_eq!(classify(&content.raw_text).kind, content.kind);
        assert!(!content.raw_text.contains("OCR"));
    }

    #[test]
    fn sql_markers() {
        let content = classify("CREATE TABLE users (id INT PRIMARY KEY);\nWrite a query.");
        assert_eq!(content.kind, ContentKind::SqlTask);
        let ContentPayload::SqlTask(sql) = content.payload else {
            panic!("expected sql payload");
        };
        assert_eq!(sql.schema.len(), 1);
    }

    #[test]
    fn concurrency_markers() {
        assert_eq!(
            classify("Implement a thread-safe counter for concurrent access").kind,
            ContentKind::MultithreadingTask
        );
        assert_eq!(
            classify("Реализуйте многопоточный обработчик").kind,
            ContentKind::MultithreadingTask
        );
    }

    #[test]
    fn concurrency_beats_numbered() {
        let content = classify("Task 1: parallel sum. Task 2: parallel sort.");
        assert_eq!(content.kind, ContentKind::MultithreadingTask);
    }

    #[test]
    fn default_is_coding_task() {
        let content = classify("Given an array, return two indices whose values add to k.");
        assert_eq!(content.kind, ContentKind::CodingTask);
        assert!(!content.raw_text.is_empty());
    }

    #[test]
    fn nonsense_input_still_classifies() {
        let content = classify("");
        assert_eq!(content.kind, ContentKind::CodingTask);
    }

    #[test]
    fn split_spans_run_to_next_marker() {
        let tasks = split_into_tasks("Problem 1: add.\nProblem 2: review this code.\nProblem 3: sort.");
        assert_eq!(tasks.len(), 3);
        assert!(tasks[0].raw_text.starts_with("Problem 1"));
        assert_eq!(tasks[1].kind, ContentKind::CodeReview);
        assert!(!tasks[0].raw_text.contains("Problem 2"));
    }

    #[test]
    fn split_without_markers_is_one_task() {
        let tasks = split_into_tasks("just one problem");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].raw_text, "just one problem");
    }

    #[test]
    fn review_payload_separates_code() {
        let content = classify("Refactor this:\n```java\nint x = 1;\n```\n");
        let ContentPayload::CodeReview(review) = content.payload else {
            panic!("expected review payload");
        };
        assert_eq!(review.code, "int x = 1;");
        assert_eq!(review.instructions, "Refactor this:");
    }

    #[test]
    fn requirements_pick_numbers_and_comparisons() {
        let reqs = extract_requirements(
            "Sum the array.\n1 <= n <= 10^5\nEach value is greater than zero\nЧисло делится на три\n\nGood luck",
        );
        assert_eq!(
            reqs,
            [
                "1 <= n <= 10^5",
                "Each value is greater than zero",
                "Число делится на три"
            ]
        );
    }

    #[test]
    fn classify_extraction_fills_coding_fields() {
        let record = ExtractionRecord {
            problem_statement: "Return the sum of the array".into(),
            constraints: "n <= 100".into(),
            example_input: "[1,2]".into(),
            example_output: "3".into(),
            fields: serde_json::Map::new(),
            fallback_used: false,
            raw_text: "{...}".into(),
        };
        let content = classify_extraction(&record);
        assert_eq!(content.raw_text, "Return the sum of the array\nn <= 100");
        let ContentPayload::CodingTask(task) = content.payload else {
            panic!("expected coding payload");
        };
        assert_eq!(task.example_output, "3");
        assert_eq!(task.requirements, ["n <= 100"]);
    }

    #[test]
    fn classify_extraction_propagates_fallback() {
        let record = ExtractionRecord::fallback("Задача 1: a\nЗадача 2: b", "raw");
        let content = classify_extraction(&record);
        assert!(content.fallback_used);
        assert_eq!(content.kind, ContentKind::Mixed);
    }

    proptest! {
        #[test]
        fn non_mixed_kind_is_stable(text in "\\PC{0,200}") {
            let first = classify(&text);
            if !first.is_mixed() {
                prop_assert_eq!(classify(&first.raw_text).kind, first.kind);
            }
        }

        #[test]
        fn extraction_kind_is_stable(
            statement in "\\PC{0,120}",
            constraints in "\\PC{0,60}",
            fallback in any::<bool>(),
        ) {
            let record = ExtractionRecord {
                problem_statement: statement,
                constraints,
                example_input: PLACEHOLDER.into(),
                example_output: PLACEHOLDER.into(),
                fields: serde_json::Map::new(),
                fallback_used: fallback,
                raw_text: "reply".into(),
            };
            let first = classify_extraction(&record);
            if !first.is_mixed() {
                prop_assert_eq!(classify(&first.raw_text).kind, first.kind);
            }
        }

        #[test]
        fn k_markers_give_k_tasks(bodies in proptest::collection::vec("[a-z ]{1,20}", 2..6)) {
            let text: String = bodies
                .iter()
                .enumerate()
                .map(|(i, b)| format!("Task {}: {b}\n", i + 1))
                .collect();
            let tasks = split_into_tasks(&text);
            prop_assert_eq!(tasks.len(), bodies.len());
            prop_assert!(tasks.iter().all(|t| !t.is_mixed()));
        }
    }
}
