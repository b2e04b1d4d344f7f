use std::sync::LazyLock;

use regex::Regex;

use crate::content::{DebugResult, SolutionResult};

pub const DEFAULT_TIME_COMPLEXITY: &str = "O(n)";
pub const DEFAULT_SPACE_COMPLEXITY: &str = "O(1)";

static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([\w+#.-]*)[ \t]*\r?\n(.*?)```").unwrap());

static THOUGHTS_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#+\s*)?\**\s*(?:your\s+|my\s+|key\s+)?(?:thoughts|reasoning|approach|insights|мысли|размышления|рассуждения|подход|ход\s+решения)\b",
    )
    .unwrap()
});

static ISSUES_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#+\s*)?\**\s*(?:issues|bugs|problems\s+found|what\s+was\s+wrong|найденные\s+проблемы|проблемы|ошибки)\b",
    )
    .unwrap()
});

static TASK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:#+\s*)?[\[*]*\s*(?:task|problem|задача|задание)\s*(?:№|#)?\s*(\d+)")
        .unwrap()
});

/// Markdown headings, bold lines and short `Label:` lines close a section.
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:#+\s+\S|\*\*[^*]+\*\*\s*:?\s*$|[^\s\-*•\d][^:]{0,40}:\s*$)").unwrap()
});

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$").unwrap());

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)(?:time\s+complexity|временн[а-я]*\s+сложност[а-я]*|сложност[а-я]*\s+по\s+времени)[ \t*]*[:：—–-]?[ \t*]*(.+)$",
    )
    .unwrap()
});

static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)(?:space\s+complexity|пространственн[а-я]*\s+сложност[а-я]*|сложност[а-я]*\s+по\s+памяти)[ \t*]*[:：—–-]?[ \t*]*(.+)$",
    )
    .unwrap()
});

/// Split a solution answer into code, thoughts and complexity estimates.
///
/// Never fails. An answer without fenced code keeps its whole text verbatim as the
/// code and sets `fallback_used`.
#[must_use]
pub fn parse_solution(text: &str) -> SolutionResult {
    let blocks: Vec<(&str, &str)> = CODE_BLOCK_RE
        .captures_iter(text)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    let fallback_used = blocks.is_empty();
    if fallback_used {
        tracing::warn!("solution output has no code block, using raw text");
    }

    let code = match blocks.as_slice() {
        [] => text.to_owned(),
        [(_, body)] => body.trim_end().to_owned(),
        many => many
            .iter()
            .enumerate()
            .map(|(i, (lang, body))| {
                format!("{} Task {}\n{}", comment_prefix(lang), i + 1, body.trim_end())
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    };

    let prose = CODE_BLOCK_RE.replace_all(text, "");

    SolutionResult {
        code,
        thoughts: thoughts(&prose),
        time_complexity: complexity(&TIME_RE, &prose, DEFAULT_TIME_COMPLEXITY),
        space_complexity: complexity(&SPACE_RE, &prose, DEFAULT_SPACE_COMPLEXITY),
        kind: None,
        tasks: Vec::new(),
        fallback_used,
    }
}

/// Bullets under an issues heading; empty when the answer has none.
#[must_use]
pub fn parse_issues(text: &str) -> Vec<String> {
    let prose = CODE_BLOCK_RE.replace_all(text, "");
    section_bullets(&prose, &ISSUES_HEADER_RE)
        .into_iter()
        .map(|(_, item)| item)
        .collect()
}

#[must_use]
pub fn parse_debug(text: &str) -> DebugResult {
    DebugResult {
        solution: parse_solution(text),
        issues: parse_issues(text),
    }
}

pub(crate) fn comment_prefix(lang: &str) -> &'static str {
    match lang.to_ascii_lowercase().as_str() {
        "python" | "py" | "ruby" | "rb" | "shell" | "sh" | "bash" | "zsh" | "r" | "perl"
        | "yaml" | "toml" | "powershell" | "ps1" | "elixir" | "julia" => "#",
        "sql" | "plsql" | "postgresql" | "mysql" | "lua" | "haskell" | "hs" => "--",
        _ => "//",
    }
}

fn thoughts(prose: &str) -> Vec<String> {
    let items = section_bullets(prose, &THOUGHTS_HEADER_RE);
    if items.is_empty() {
        return prose
            .lines()
            .filter(|l| !TIME_RE.is_match(l) && !SPACE_RE.is_match(l))
            .filter_map(bullet)
            .collect();
    }

    let task_headers = prose.lines().filter(|l| TASK_HEADER_RE.is_match(l)).count();
    items
        .into_iter()
        .map(|(task, item)| match task {
            Some(n) if task_headers > 1 => format!("[Task {n}] {item}"),
            _ => item,
        })
        .collect()
}

/// Bullets inside every section whose heading matches `header`, tagged with the
/// task number in effect.
fn section_bullets(prose: &str, header: &Regex) -> Vec<(Option<u32>, String)> {
    let mut items = Vec::new();
    let mut task = None;
    let mut inside = false;

    for line in prose.lines() {
        if let Some(caps) = TASK_HEADER_RE.captures(line)
            && BULLET_RE.captures(line).is_none()
        {
            task = caps.get(1).and_then(|m| m.as_str().parse().ok());
            inside = false;
            continue;
        }
        if header.is_match(line) {
            inside = true;
            continue;
        }
        if !inside {
            continue;
        }
        if TIME_RE.is_match(line) || SPACE_RE.is_match(line) || HEADING_RE.is_match(line) {
            inside = false;
            continue;
        }
        if let Some(item) = bullet(line) {
            items.push((task, item));
        }
    }
    items
}

fn bullet(line: &str) -> Option<String> {
    let item = BULLET_RE.captures(line)?.get(1)?.as_str().trim();
    (!item.is_empty()).then(|| item.to_owned())
}

fn complexity(re: &Regex, prose: &str, default: &str) -> String {
    let found: Vec<&str> = re
        .captures_iter(prose)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_matches(|c: char| c.is_whitespace() || "*:：—–-".contains(c)))
        .filter(|s| !s.is_empty())
        .collect();
    if found.is_empty() {
        default.to_owned()
    } else {
        found.join("; ")
    }
}
