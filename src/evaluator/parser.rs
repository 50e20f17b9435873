// src/evaluator/parser.rs — Parse judge responses into EvaluationResult

use serde_json::Value;

use crate::core::types::EvaluationResult;
use crate::infra::errors::ArcherError;

/// Parse a judge response.
///
/// A JSON object is tried first (anywhere in the text, fenced or not):
/// ```text
/// {"score": 4, "feedback": "...", "improved_output": "...", "summary": "..."}
/// ```
/// Otherwise the sectioned format:
/// ```text
/// SCORE: 4/5
/// FEEDBACK: ...
/// IMPROVED_OUTPUT: ...
/// SUMMARY: ...
/// ```
/// A score outside `[0, max_score]` is a parse error.
pub fn parse_evaluation(response: &str, max_score: f32) -> Result<EvaluationResult, ArcherError> {
    if let Some(result) = parse_json(response) {
        return validate(result?, max_score);
    }
    validate(parse_sections(response)?, max_score)
}

fn validate(result: EvaluationResult, max_score: f32) -> Result<EvaluationResult, ArcherError> {
    if !result.score.is_finite() || result.score < 0.0 || result.score > max_score {
        return Err(ArcherError::Parse(format!(
            "score {} outside 0-{}",
            result.score, max_score
        )));
    }
    Ok(result)
}

/// `None` when the text holds no JSON object at all.
fn parse_json(response: &str) -> Option<Result<EvaluationResult, ArcherError>> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&response[start..=end]).ok()?;
    let obj = value.as_object()?;

    let field = |names: &[&str]| -> Option<&Value> { names.iter().find_map(|n| obj.get(*n)) };
    let text = |names: &[&str]| -> String {
        match field(names) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    };

    let score = match field(&["score", "rating", "grade"]) {
        Some(Value::Number(n)) => n.as_f64().map(|f| f as f32),
        Some(Value::String(s)) => parse_score_value(s),
        _ => None,
    };
    let Some(score) = score else {
        return Some(Err(ArcherError::Parse("JSON evaluation has no score".into())));
    };

    Some(Ok(EvaluationResult {
        score,
        feedback: text(&["feedback", "critique", "reasoning"]),
        improved_output: text(&["improved_output", "improved_response", "improvement"]),
        summary: text(&["summary"]),
    }))
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Feedback,
    Improved,
    Summary,
}

fn parse_sections(response: &str) -> Result<EvaluationResult, ArcherError> {
    let mut score = None;
    let mut feedback = Vec::new();
    let mut improved = Vec::new();
    let mut summary = Vec::new();
    let mut section = Section::None;

    for line in response.lines() {
        let trimmed = line.trim().trim_start_matches(['#', '*']).trim();

        if let Some(rest) = strip_label(trimmed, "SCORE") {
            score = score.or_else(|| parse_score_value(rest));
            section = Section::None;
            continue;
        }
        let header = [
            ("FEEDBACK", Section::Feedback),
            ("IMPROVED_OUTPUT", Section::Improved),
            ("IMPROVED OUTPUT", Section::Improved),
            ("SUMMARY", Section::Summary),
        ]
        .into_iter()
        .find_map(|(label, s)| strip_label(trimmed, label).map(|rest| (rest, s)));

        let (content, target) = match header {
            Some((rest, s)) => {
                section = s;
                (rest, s)
            }
            None => (line.trim_end(), section),
        };
        let bucket = match target {
            Section::Feedback => &mut feedback,
            Section::Improved => &mut improved,
            Section::Summary => &mut summary,
            Section::None => continue,
        };
        if !(header.is_some() && content.is_empty()) {
            bucket.push(content.to_string());
        }
    }

    let score = score.ok_or_else(|| ArcherError::Parse("no SCORE found in evaluation".into()))?;
    Ok(EvaluationResult {
        score,
        feedback: join(&feedback),
        improved_output: join(&improved),
        summary: join(&summary),
    })
}

fn join(lines: &[String]) -> String {
    lines.join("\n").trim().to_string()
}

/// Case-insensitive `LABEL:` prefix.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = line[label.len()..].trim_start_matches('*').trim_start();
    let rest = rest.strip_prefix(':')?;
    Some(rest.trim_start_matches('*').trim())
}

/// `4`, `4.5`, `4/5`, `4 out of 5`. Only the numerator is kept.
pub(crate) fn parse_score_value(raw: &str) -> Option<f32> {
    let raw = raw.trim().trim_matches('*').trim();
    let numeric: String = raw
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    numeric.parse().ok()
}
