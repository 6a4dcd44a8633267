use crate::error::Result;
use crate::survey::AnswerRecord;
use log::debug;
use rusqlite::Connection;

/// Column widths of the answer table's descriptive fields. SQLite does not
/// enforce declared widths, so values are bounded here before the write.
const MAX_LEVEL: usize = 3;
const MAX_DEPARTMENT: usize = 75;
const MAX_DEGREE: usize = 4;
const MAX_GROUP: usize = 11;
const MAX_SUBJECT_CODE: usize = 10;
const MAX_SUBJECT_NAME: usize = 75;
const MAX_TRAINER: usize = 75;
const MAX_TOPIC: usize = 25;

/// Persists normalized records as one batch inside one transaction and
/// returns the number of rows written. Evaluation ids continue from the
/// table's current maximum: every record of one submission shares one id,
/// the next submission takes the next one. Existing rows are never touched.
pub fn import_answers(conn: &mut Connection, mut records: Vec<AnswerRecord>) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;

    let last: i64 = tx.query_row(
        "SELECT COALESCE(MAX(evaluation_id), 0) FROM answer",
        [],
        |row| row.get(0),
    )?;

    // question_sort restarts at 1 on every submission; that reset marks
    // the group boundary.
    let mut next = last;
    let mut first = true;
    for record in &mut records {
        if first || record.question_sort == 1 {
            next += 1;
            first = false;
        }
        record.evaluation_id = next;

        record.level = cut(&record.level, MAX_LEVEL);
        record.department = cut(&record.department, MAX_DEPARTMENT);
        record.degree = cut(&record.degree, MAX_DEGREE);
        record.group = cut(&record.group, MAX_GROUP);
        record.subject_code = cut(&record.subject_code, MAX_SUBJECT_CODE);
        record.subject_name = cut(&record.subject_name, MAX_SUBJECT_NAME);
        record.trainer = cut(&record.trainer, MAX_TRAINER);
        record.topic = cut(&record.topic, MAX_TOPIC);
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO answer(
                evaluation_id, \"timestamp\", year, level, department, degree, \"group\",
                subject_code, subject_name, trainer, topic,
                question_sort, question_type, question_statement, value)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for r in &records {
            stmt.execute((
                r.evaluation_id,
                r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                r.year,
                &r.level,
                &r.department,
                &r.degree,
                &r.group,
                &r.subject_code,
                &r.subject_name,
                &r.trainer,
                &r.topic,
                r.question_sort,
                r.question_type.as_str(),
                &r.question_statement,
                &r.value,
            ))?;
        }
    }

    tx.commit()?;
    debug!(
        "imported {} answer rows, evaluation ids {}..={}",
        records.len(),
        last + 1,
        next
    );
    Ok(records.len())
}

/// Bounds `text` to at most `max` characters. Silent on oversized input;
/// anything already within the bound (including empty) passes through.
pub fn cut(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
