use rusqlite::Connection;

/// The pre-upgrade schema: loosely-typed foreign keys on the master and
/// forms tables, and a view-only reporting layer whose `answer` view is
/// the big evaluation join.
const LEGACY_SCHEMA: &str = "
CREATE TABLE master_level(id INTEGER PRIMARY KEY, code TEXT, name TEXT);
CREATE TABLE master_department(id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE master_degree(id INTEGER PRIMARY KEY, code TEXT NOT NULL, name TEXT NOT NULL,
    level_id TEXT, department_id TEXT);
CREATE TABLE master_group(id INTEGER PRIMARY KEY, name TEXT NOT NULL, degree_id TEXT);
CREATE TABLE master_trainer(id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE master_topic(id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE master_type(id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE master_question(id INTEGER PRIMARY KEY, sort INTEGER, statement TEXT NOT NULL,
    topic_id TEXT, type_id TEXT, level_id TEXT);
CREATE TABLE master_student(id INTEGER PRIMARY KEY, email TEXT, name TEXT, surname TEXT,
    group_id TEXT);
CREATE TABLE master_subject(id INTEGER PRIMARY KEY, code TEXT NOT NULL, name TEXT NOT NULL,
    degree_id TEXT, topic_id TEXT);
CREATE TABLE master_subject_student(student_id INTEGER, subject_id TEXT);
CREATE TABLE master_subject_trainer_group(subject_id TEXT, trainer_id TEXT, group_id TEXT);
CREATE TABLE forms_evaluation(id INTEGER PRIMARY KEY, \"timestamp\" TEXT, group_id TEXT,
    subject_id TEXT, trainer_id TEXT);
CREATE TABLE forms_answer(evaluation_id INTEGER, question_id TEXT, value TEXT);
CREATE TABLE forms_participation(student_id TEXT, \"timestamp\" TEXT);

CREATE VIEW forms_subject AS
SELECT sb.id, sb.code, sb.name, sb.degree_id
FROM master_subject sb;

CREATE VIEW forms_student AS
SELECT st.id, st.email, st.name, st.surname, st.group_id
FROM master_student st;

CREATE VIEW participation AS
SELECT pa.\"timestamp\", st.email, st.surname, st.name
FROM forms_participation pa
    LEFT JOIN master_student st ON st.id = pa.student_id;

CREATE VIEW answer AS
SELECT ev.id AS evaluation_id,
    ev.\"timestamp\",
    CAST(strftime('%Y', ev.\"timestamp\") AS INTEGER) AS year,
    lv.code AS level,
    de.name AS department,
    dg.code AS degree,
    gr.name AS \"group\",
    su.code AS subject_code,
    su.name AS subject_name,
    tr.name AS trainer,
    tp.name AS topic,
    qu.sort AS question_sort,
    ty.name AS question_type,
    qu.statement AS question_statement,
    an.value
FROM forms_evaluation ev
    LEFT JOIN master_group gr ON gr.id = ev.group_id
    LEFT JOIN master_trainer tr ON tr.id = ev.trainer_id
    LEFT JOIN master_subject su ON su.id = ev.subject_id
    LEFT JOIN forms_answer an ON an.evaluation_id = ev.id
    LEFT JOIN master_question qu ON qu.id = an.question_id
    LEFT JOIN master_degree dg ON dg.id = su.degree_id
    LEFT JOIN master_department de ON de.id = dg.department_id
    LEFT JOIN master_level lv ON lv.id = dg.level_id
    LEFT JOIN master_topic tp ON tp.id = qu.topic_id
    LEFT JOIN master_type ty ON ty.id = qu.type_id;
";

/// One complete submission: a CF/DAM evaluation with one rated answer.
const LEGACY_DATA: &str = "
INSERT INTO master_level(id, code, name) VALUES (1, 'CF', 'Cicles Formatius');
INSERT INTO master_department(id, name) VALUES (1, 'Informàtica i comunicacions');
INSERT INTO master_degree(id, code, name, level_id, department_id)
    VALUES (1, 'DAM', 'Desenvolupament d''aplicacions multiplataforma', '1', '1');
INSERT INTO master_group(id, name, degree_id) VALUES (1, 'DAM2A', '1');
INSERT INTO master_trainer(id, name) VALUES (1, 'Maria Puig');
INSERT INTO master_topic(id, name) VALUES (1, 'Assignatura');
INSERT INTO master_type(id, name) VALUES (1, 'Numeric');
INSERT INTO master_question(id, sort, statement, topic_id, type_id, level_id)
    VALUES (1, 1, 'Rate the course', '1', '1', '1');
INSERT INTO master_subject(id, code, name, degree_id, topic_id)
    VALUES (1, 'MP06', 'Accés a dades', '1', '1');
INSERT INTO master_student(id, email, name, surname, group_id)
    VALUES (1, 'joan.serra@example.cat', 'Joan', 'Serra', '1');
INSERT INTO master_subject_student(student_id, subject_id) VALUES (1, '1');
INSERT INTO master_subject_trainer_group(subject_id, trainer_id, group_id)
    VALUES ('1', '1', '1');
INSERT INTO forms_evaluation(id, \"timestamp\", group_id, subject_id, trainer_id)
    VALUES (1, '2023-05-01 10:00:00', '1', '1', '1');
INSERT INTO forms_answer(evaluation_id, question_id, value) VALUES (1, '1', '5');
INSERT INTO forms_participation(student_id, \"timestamp\")
    VALUES ('1', '2023-05-01 10:00:00');
";

pub fn legacy_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(LEGACY_SCHEMA).expect("seed legacy schema");
    conn.execute_batch(LEGACY_DATA).expect("seed legacy data");
    conn
}

/// Full catalog snapshot, for byte-for-byte schema comparisons.
#[allow(dead_code)]
pub fn schema_dump(conn: &Connection) -> Vec<(String, String, Option<String>)> {
    let mut stmt = conn
        .prepare("SELECT type, name, sql FROM sqlite_master ORDER BY type, name")
        .expect("prepare dump");
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .expect("query dump")
        .collect::<Result<Vec<_>, _>>()
        .expect("dump rows")
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .expect("count")
}
