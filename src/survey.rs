use crate::error::{Error, Result};
use chrono::{Datelike, Local, NaiveDateTime};
use serde::Deserialize;
use std::collections::HashMap;

/// Field-name conventions used by the survey tool inside an answer group.
/// Rated answers arrive as `questions[<code>]`, free-text ones as
/// `comments<n>`; everything else in the group is shared per submission.
const NUMERIC_PREFIX: &str = "questions";
const COMMENT_PREFIX: &str = "comments";
const SUBMIT_DATE_FIELD: &str = "submitdate";
const SUBMIT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionType {
    Numeric,
    Text,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Numeric => "Numeric",
            QuestionType::Text => "Text",
        }
    }
}

/// One survey question as exported by the survey service: `title` carries
/// the question code, `question` the statement shown to respondents.
#[derive(Debug, Clone, Deserialize)]
pub struct SurveyQuestion {
    #[serde(rename = "title")]
    pub code: String,
    #[serde(rename = "question")]
    pub statement: String,
}

/// One respondent's answer to one question, flattened for the reporting
/// table. `evaluation_id` stays 0 until the importer assigns the real one;
/// apart from that pass (and its length bounding) records are never
/// mutated after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    pub evaluation_id: i64,
    pub question_sort: i64,
    pub timestamp: NaiveDateTime,
    pub year: i32,
    pub value: String,
    pub question_statement: String,
    pub question_type: QuestionType,
    pub level: String,
    pub department: String,
    pub degree: String,
    pub group: String,
    pub subject_code: String,
    pub subject_name: String,
    pub trainer: String,
    pub topic: String,
}

/// Answer fields of one submission, decoded and classified once so that
/// nothing downstream has to sniff raw field names again.
struct Submission {
    timestamp: NaiveDateTime,
    numeric: Vec<TaggedAnswer>,
    comments: Vec<TaggedAnswer>,
    dims: Dimensions,
}

struct TaggedAnswer {
    field: String,
    code: String,
    value: String,
}

#[derive(Default)]
struct Dimensions {
    level: String,
    department: String,
    degree: String,
    group: String,
    subject_code: String,
    subject_name: String,
    trainer: String,
    topic: String,
}

/// Turns one point-in-time response export into the ordered, flat answer
/// records the importer persists. Pure transformation: same input, same
/// output, no I/O. Fails without producing any record when a submission is
/// malformed or a rated answer references an unknown question code.
pub fn normalize(
    questions: &[SurveyQuestion],
    payload: &serde_json::Value,
) -> Result<Vec<AnswerRecord>> {
    let statements: HashMap<&str, &str> = questions
        .iter()
        .map(|q| (q.code.as_str(), q.statement.as_str()))
        .collect();

    let responses = payload
        .get("responses")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::MalformedResponse("the 'responses' array is missing".into()))?;

    let mut records = Vec::new();
    for entry in responses {
        let submission = decode_submission(entry)?;
        push_records(&statements, &submission, &mut records)?;
    }
    Ok(records)
}

fn decode_submission(entry: &serde_json::Value) -> Result<Submission> {
    let group = answer_group(entry)?;

    let mut numeric = Vec::new();
    let mut comments = Vec::new();
    let mut dims = Dimensions::default();
    let mut submitted: Option<String> = None;

    for (name, value) in group {
        let text = text_value(value);
        if name.starts_with(NUMERIC_PREFIX) {
            let code = bracketed_code(name).ok_or_else(|| {
                Error::MalformedResponse(format!(
                    "answer field '{}' has no bracketed question code",
                    name
                ))
            })?;
            numeric.push(TaggedAnswer {
                field: name.clone(),
                code: code.to_string(),
                value: text,
            });
        } else if name.starts_with(COMMENT_PREFIX) {
            comments.push(TaggedAnswer {
                field: name.clone(),
                code: name.clone(),
                value: text,
            });
        } else {
            match name.as_str() {
                SUBMIT_DATE_FIELD => submitted = Some(text),
                "level" => dims.level = text,
                "department" => dims.department = text,
                "degree" => dims.degree = text,
                "group" => dims.group = text,
                "subjectcode" => dims.subject_code = text,
                "subjectname" => dims.subject_name = text,
                "trainer" => dims.trainer = text,
                "topic" => dims.topic = text,
                _ => {}
            }
        }
    }

    numeric.sort_by(|a, b| a.field.cmp(&b.field));
    comments.sort_by(|a, b| a.field.cmp(&b.field));

    Ok(Submission {
        timestamp: parse_submit_date(submitted.as_deref()),
        numeric,
        comments,
        dims,
    })
}

/// Locates the single numbered answer-group object inside a response
/// entry. The export wraps every submission's fields in one group keyed by
/// a number (usually "1").
fn answer_group(entry: &serde_json::Value) -> Result<&serde_json::Map<String, serde_json::Value>> {
    let obj = entry
        .as_object()
        .ok_or_else(|| Error::MalformedResponse("response entry is not an object".into()))?;

    let mut groups = obj
        .iter()
        .filter(|(k, _)| !k.is_empty() && k.bytes().all(|b| b.is_ascii_digit()))
        .map(|(_, v)| v);
    let group = match (groups.next(), groups.next()) {
        (Some(v), None) => v,
        (None, _) => {
            return Err(Error::MalformedResponse(
                "response entry has no answer group".into(),
            ))
        }
        (Some(_), Some(_)) => {
            return Err(Error::MalformedResponse(
                "response entry has more than one answer group".into(),
            ))
        }
    };
    group
        .as_object()
        .ok_or_else(|| Error::MalformedResponse("answer group is not an object".into()))
}

fn text_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Code between the first '[' and the following ']' of an answer field
/// name, e.g. "questions[Q1]" -> "Q1".
fn bracketed_code(name: &str) -> Option<&str> {
    let open = name.find('[')?;
    let rest = &name[open + 1..];
    let close = rest.find(']')?;
    let code = &rest[..close];
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

/// Submission timestamps are best-effort: an unparsable or missing
/// `submitdate` falls back to the processing instant instead of failing.
fn parse_submit_date(raw: Option<&str>) -> NaiveDateTime {
    raw.and_then(|s| NaiveDateTime::parse_from_str(s.trim(), SUBMIT_DATE_FORMAT).ok())
        .unwrap_or_else(|| Local::now().naive_local())
}

fn push_records(
    statements: &HashMap<&str, &str>,
    submission: &Submission,
    records: &mut Vec<AnswerRecord>,
) -> Result<()> {
    // Sort order spans both classes: rated answers first, comments after,
    // each ordered by field name. Restarts at 1 for every submission.
    let mut sort = 1;
    for answer in &submission.numeric {
        let statement = statements
            .get(answer.code.as_str())
            .copied()
            .ok_or_else(|| Error::MissingStatement(answer.code.clone()))?;
        records.push(make_record(
            submission,
            answer,
            sort,
            statement,
            QuestionType::Numeric,
        ));
        sort += 1;
    }
    for answer in &submission.comments {
        // Comment fields carry no statement of their own in the export.
        let statement = statements
            .get(answer.code.as_str())
            .copied()
            .unwrap_or_default();
        records.push(make_record(
            submission,
            answer,
            sort,
            statement,
            QuestionType::Text,
        ));
        sort += 1;
    }
    Ok(())
}

fn make_record(
    submission: &Submission,
    answer: &TaggedAnswer,
    sort: i64,
    statement: &str,
    question_type: QuestionType,
) -> AnswerRecord {
    AnswerRecord {
        evaluation_id: 0,
        question_sort: sort,
        timestamp: submission.timestamp,
        year: submission.timestamp.year(),
        value: answer.value.clone(),
        question_statement: statement.to_string(),
        question_type,
        level: submission.dims.level.clone(),
        department: submission.dims.department.clone(),
        degree: submission.dims.degree.clone(),
        group: submission.dims.group.clone(),
        subject_code: submission.dims.subject_code.clone(),
        subject_name: submission.dims.subject_name.clone(),
        trainer: submission.dims.trainer.clone(),
        topic: submission.dims.topic.clone(),
    }
}
