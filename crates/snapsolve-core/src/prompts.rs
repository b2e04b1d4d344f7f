use std::fmt::Write as _;

use crate::content::{ContentKind, ContentPayload, ExtractedContent, SolutionResult};

pub const EXTRACTION_SYSTEM_PROMPT: &str = "\
You read screenshots of programming tasks and transcribe them.\n\
\n\
Respond with a single JSON object and nothing else. No Markdown, no commentary.\n\
The object MUST have exactly these string keys:\n\
- \"problem_statement\": the full task text, including every numbered task if there are several\n\
- \"constraints\": input limits and requirements, or \"\" if none\n\
- \"example_input\": the sample input, or \"\" if none\n\
- \"example_output\": the sample output, or \"\" if none\n\
\n\
Copy code and SQL from the screenshots verbatim inside problem_statement. \
Keep the original language of the task text.";

pub const SOLUTION_SYSTEM_PROMPT: &str = "\
You are an expert competitive programmer and code reviewer.\n\
\n\
Structure every answer like this:\n\
Thoughts:\n\
- one bullet per key insight\n\
\n\
The complete code in one fenced code block with a language tag.\n\
\n\
Time complexity: O(...) with a one-line justification\n\
Space complexity: O(...) with a one-line justification";

pub const DEBUG_SYSTEM_PROMPT: &str = "\
You are debugging a previous solution against new screenshots that show errors, \
failing tests or a changed task.\n\
\n\
Structure the answer like this:\n\
Issues:\n\
- one bullet per problem found in the previous code\n\
\n\
The corrected code in one fenced code block with a language tag.\n\
\n\
Thoughts:\n\
- one bullet per change you made\n\
\n\
Time complexity: O(...)\n\
Space complexity: O(...)";

#[must_use]
pub fn extraction_instruction(language: &str) -> String {
    format!(
        "Extract the task from these screenshots as the JSON object described. \
         The solution will be written in {language}."
    )
}

/// User prompt for solving one non-mixed task.
#[must_use]
pub fn solve_prompt(content: &ExtractedContent, language: &str) -> String {
    match (&content.kind, &content.payload) {
        (ContentKind::CodeReview, ContentPayload::CodeReview(review)) => {
            let mut prompt = String::from(
                "Review the code below. Find the bugs, code smells and design problems, \
                 list them as Thoughts, then rewrite the code with every issue fixed.\n",
            );
            if !review.instructions.is_empty() {
                let _ = write!(prompt, "\nReviewer instructions:\n{}\n", review.instructions);
            }
            let _ = write!(prompt, "\nCode:\n{}\n", review.code);
            prompt.push_str("\nKeep the code in its original language.");
            prompt
        }
        (ContentKind::SqlTask, ContentPayload::SqlTask(sql)) => {
            let mut prompt = String::from(
                "Solve this SQL task. Write a single correct query in a ```sql block \
                 and explain how it works, including joins and grouping, as Thoughts.\n",
            );
            if !sql.schema.is_empty() {
                let _ = write!(prompt, "\nSchema:\n{}\n", sql.schema.join("\n"));
            }
            let _ = write!(prompt, "\nTask:\n{}", sql.statement);
            prompt
        }
        (ContentKind::MultithreadingTask, _) => format!(
            "Solve this concurrency task in {language}. Make the code thread-safe, \
             name the synchronization primitives you use and explain in Thoughts \
             why the solution has no data races or deadlocks.\n\nTask:\n{}",
            task_text(content)
        ),
        _ => coding_prompt(content, language),
    }
}

#[must_use]
pub fn debug_prompt(previous: &SolutionResult, language: &str) -> String {
    let mut prompt = format!(
        "The screenshots show what went wrong with the previous {language} solution. \
         Find the issues and fix them.\n\nPrevious code:\n```{language}\n{}\n```\n",
        previous.code
    );
    if !previous.thoughts.is_empty() {
        prompt.push_str("\nPrevious reasoning:\n");
        for thought in &previous.thoughts {
            let _ = writeln!(prompt, "- {thought}");
        }
    }
    prompt
}

fn coding_prompt(content: &ExtractedContent, language: &str) -> String {
    let ContentPayload::CodingTask(task) = &content.payload else {
        return format!(
            "Solve this programming task in {language}.\n\nTask:\n{}",
            content.raw_text
        );
    };
    let mut prompt = format!(
        "Solve this programming task in {language}.\n\nProblem:\n{}\n",
        task.problem_statement
    );
    for (label, value) in [
        ("Constraints", &task.constraints),
        ("Example input", &task.example_input),
        ("Example output", &task.example_output),
    ] {
        if !value.trim().is_empty() {
            let _ = write!(prompt, "\n{label}:\n{value}\n");
        }
    }
    if !task.requirements.is_empty() {
        prompt.push_str("\nRequirements to respect:\n");
        for req in &task.requirements {
            let _ = writeln!(prompt, "- {req}");
        }
    }
    prompt
}

fn task_text(content: &ExtractedContent) -> &str {
    match &content.payload {
        ContentPayload::CodingTask(task) if !task.problem_statement.is_empty() => {
            &task.problem_statement
        }
        _ => &content.raw_text,
    }
}
