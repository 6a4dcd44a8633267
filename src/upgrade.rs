//! One-time upgrade of the legacy view-based reporting layer into the
//! table-based one, plus the pre-flight gate and the legacy-data
//! consolidation. Every write path here is one transaction: either the
//! whole step sequence applies or the schema is left exactly as found.

use crate::db::object_exists;
use crate::error::{Error, Result};
use log::{debug, info};
use rusqlite::{Connection, Transaction};

/// Column projection shared by the answer table, the `answer_all` view and
/// the filtered views. Downstream dashboards are bound to these exact
/// names and positions; do not reorder.
const ANSWER_COLUMNS: &str = "evaluation_id, \"timestamp\", year, level, department, degree, \
    \"group\", subject_code, subject_name, trainer, topic, question_sort, question_type, \
    question_statement, value";

const CREATE_ANSWER_TABLE: &str = "CREATE TABLE answer(
    evaluation_id INTEGER,
    \"timestamp\" TEXT,
    year INTEGER,
    level TEXT,
    department TEXT,
    degree TEXT,
    \"group\" TEXT,
    subject_code TEXT,
    subject_name TEXT,
    trainer TEXT,
    topic TEXT,
    question_sort INTEGER,
    question_type TEXT,
    question_statement TEXT,
    value TEXT
)";

const CREATE_FORMS_SUBJECT_VIEW: &str = "CREATE VIEW forms_subject AS
SELECT sb.id,
    sb.code,
    CASE WHEN tr.name IS NULL THEN sb.name ELSE sb.name || ' (' || tr.name || ')' END AS name,
    dg.id AS degree_id,
    dg.code AS degree_code,
    dg.name AS degree_name,
    tr.id AS trainer_id,
    st.group_id
FROM master_subject sb
    LEFT JOIN master_degree dg ON dg.id = sb.degree_id
    LEFT JOIN master_subject_trainer_group st ON st.subject_id = sb.id
    LEFT JOIN master_trainer tr ON tr.id = st.trainer_id";

const CREATE_FORMS_STUDENT_VIEW: &str = "CREATE VIEW forms_student AS
SELECT st.id,
    st.email,
    st.name,
    st.surname,
    lv.id AS level_id,
    lv.code AS level_code,
    lv.name AS level_name,
    gr.id AS group_id,
    gr.name AS group_name,
    dg.id AS degree_id,
    dg.code AS degree_code,
    subjects.subjects
FROM master_student st
    LEFT JOIN master_group gr ON gr.id = st.group_id
    LEFT JOIN master_degree dg ON dg.id = gr.degree_id
    LEFT JOIN master_level lv ON lv.id = dg.level_id
    LEFT JOIN (SELECT ss.student_id, group_concat(su.code, ',') AS subjects
        FROM master_subject_student ss
            LEFT JOIN master_subject su ON ss.subject_id = su.id
        GROUP BY ss.student_id) subjects ON subjects.student_id = st.id";

const CREATE_PARTICIPATION_VIEW: &str = "CREATE VIEW participation AS
SELECT pa.\"timestamp\",
    st.email,
    st.surname,
    st.name,
    gr.name AS group_name,
    dg.name AS degree_name,
    lv.name AS level_name,
    de.name AS department_name
FROM forms_participation pa
    LEFT JOIN master_student st ON st.id = pa.student_id
    LEFT JOIN master_group gr ON gr.id = st.group_id
    LEFT JOIN master_degree dg ON dg.id = gr.degree_id
    LEFT JOIN master_level lv ON lv.id = dg.level_id
    LEFT JOIN master_department de ON de.id = dg.department_id";

const CREATE_ANSWER_ALL_VIEW: &str = "CREATE VIEW answer_all AS
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
    LEFT JOIN master_type ty ON ty.id = qu.type_id";

/// Per-department/topic reporting views. A flat enumeration on purpose:
/// each one is a stable external contract, bound by name and shape to a
/// downstream dashboard.
const FILTERED_VIEWS: &[(&str, &str)] = &[
    ("answer_cf", "level = 'CF'"),
    ("answer_cf_mp", "level = 'CF' AND topic = 'Assignatura'"),
    ("answer_dept_adm", "department = 'Administració i gestió'"),
    (
        "answer_dept_adm_mp",
        "department = 'Administració i gestió' AND topic = 'Assignatura'",
    ),
    ("answer_dept_inf", "department = 'Informàtica i comunicacions'"),
    (
        "answer_dept_inf_mp",
        "department = 'Informàtica i comunicacions' AND topic = 'Assignatura'",
    ),
];

/// Master/operational tables whose foreign-key columns migrate from loose
/// text to INTEGER. SQLite cannot retype a column in place, so each table
/// is rebuilt: rename aside, create with the strict schema, copy with an
/// explicit CAST per retyped column, drop the old table.
struct TableRebuild {
    name: &'static str,
    create_sql: &'static str,
    copy_select: &'static str,
}

const RETYPED_TABLES: &[TableRebuild] = &[
    TableRebuild {
        name: "master_group",
        create_sql: "CREATE TABLE master_group(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            degree_id INTEGER)",
        copy_select: "SELECT id, name, CAST(degree_id AS INTEGER)
            FROM master_group_old",
    },
    TableRebuild {
        name: "master_degree",
        create_sql: "CREATE TABLE master_degree(
            id INTEGER PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            level_id INTEGER,
            department_id INTEGER)",
        copy_select: "SELECT id, code, name, CAST(level_id AS INTEGER),
            CAST(department_id AS INTEGER)
            FROM master_degree_old",
    },
    TableRebuild {
        name: "master_question",
        create_sql: "CREATE TABLE master_question(
            id INTEGER PRIMARY KEY,
            sort INTEGER,
            statement TEXT NOT NULL,
            topic_id INTEGER,
            type_id INTEGER,
            level_id INTEGER)",
        copy_select: "SELECT id, sort, statement, CAST(topic_id AS INTEGER),
            CAST(type_id AS INTEGER), CAST(level_id AS INTEGER)
            FROM master_question_old",
    },
    TableRebuild {
        name: "master_student",
        create_sql: "CREATE TABLE master_student(
            id INTEGER PRIMARY KEY,
            email TEXT,
            name TEXT,
            surname TEXT,
            group_id INTEGER)",
        copy_select: "SELECT id, email, name, surname, CAST(group_id AS INTEGER)
            FROM master_student_old",
    },
    TableRebuild {
        name: "master_subject",
        create_sql: "CREATE TABLE master_subject(
            id INTEGER PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            degree_id INTEGER,
            topic_id INTEGER)",
        copy_select: "SELECT id, code, name, CAST(degree_id AS INTEGER),
            CAST(topic_id AS INTEGER)
            FROM master_subject_old",
    },
    TableRebuild {
        name: "master_subject_student",
        create_sql: "CREATE TABLE master_subject_student(
            student_id INTEGER,
            subject_id INTEGER)",
        copy_select: "SELECT student_id, CAST(subject_id AS INTEGER)
            FROM master_subject_student_old",
    },
    TableRebuild {
        name: "master_subject_trainer_group",
        create_sql: "CREATE TABLE master_subject_trainer_group(
            subject_id INTEGER,
            trainer_id INTEGER,
            group_id INTEGER)",
        copy_select: "SELECT CAST(subject_id AS INTEGER), CAST(trainer_id AS INTEGER),
            CAST(group_id AS INTEGER)
            FROM master_subject_trainer_group_old",
    },
    TableRebuild {
        name: "forms_participation",
        create_sql: "CREATE TABLE forms_participation(
            student_id INTEGER,
            \"timestamp\" TEXT)",
        copy_select: "SELECT CAST(student_id AS INTEGER), \"timestamp\"
            FROM forms_participation_old",
    },
    TableRebuild {
        name: "forms_evaluation",
        create_sql: "CREATE TABLE forms_evaluation(
            id INTEGER PRIMARY KEY,
            \"timestamp\" TEXT,
            group_id INTEGER,
            subject_id INTEGER,
            trainer_id INTEGER)",
        copy_select: "SELECT id, \"timestamp\", CAST(group_id AS INTEGER),
            CAST(subject_id AS INTEGER), CAST(trainer_id AS INTEGER)
            FROM forms_evaluation_old",
    },
    TableRebuild {
        name: "forms_answer",
        create_sql: "CREATE TABLE forms_answer(
            evaluation_id INTEGER,
            question_id INTEGER,
            value TEXT)",
        copy_select: "SELECT evaluation_id, CAST(question_id AS INTEGER), value
            FROM forms_answer_old",
    },
];

/// The un-upgraded schema exposes `answer` only as a view; the physical
/// table appears once the upgrade has run. Read-only, no transaction.
pub fn is_upgraded(conn: &Connection) -> Result<bool> {
    object_exists(conn, "table", "answer")
}

/// Converts the legacy view-based reporting layer into the table-based
/// one. Invoked at most once per database lifetime; the caller checks
/// [`is_upgraded`] first. Running it against an already-upgraded schema
/// fails at the first step, with nothing applied.
pub fn perform_database_upgrade(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    // 1. The legacy reporting view becomes the archival answer_all view.
    rename_view(&tx, "answer", "answer_all")?;
    debug!("renamed view answer -> answer_all");

    // 2. Materialize it as the physical answer table, clear the
    //    operational tables that fed it (children before parents), and
    //    index the year column the reports filter on.
    tx.execute_batch(&format!(
        "{CREATE_ANSWER_TABLE};
        INSERT INTO answer({ANSWER_COLUMNS}) SELECT {ANSWER_COLUMNS} FROM answer_all;
        DELETE FROM forms_answer;
        DELETE FROM forms_participation;
        DELETE FROM forms_evaluation;
        CREATE INDEX answer_year_idx ON answer(year);"
    ))?;
    debug!("materialized answer table");

    // 3. Drop the views orphaned by the retype, then migrate the loose
    //    foreign-key columns to INTEGER table by table.
    tx.execute_batch(
        "DROP VIEW forms_subject;
        DROP VIEW forms_student;
        DROP VIEW participation;
        DROP VIEW answer_all;",
    )?;
    for table in RETYPED_TABLES {
        rebuild_table(&tx, table)?;
    }
    debug!("retyped foreign-key columns");

    // 4. Recreate the dropped views with the corrected joins, then the
    //    unified reporting view and its filtered derivatives.
    tx.execute_batch(CREATE_FORMS_SUBJECT_VIEW)?;
    tx.execute_batch(CREATE_FORMS_STUDENT_VIEW)?;
    tx.execute_batch(CREATE_PARTICIPATION_VIEW)?;
    tx.execute_batch(CREATE_ANSWER_ALL_VIEW)?;
    for (name, predicate) in FILTERED_VIEWS {
        tx.execute_batch(&format!(
            "CREATE VIEW {name} AS SELECT {ANSWER_COLUMNS} FROM answer_all WHERE {predicate}"
        ))?;
    }

    tx.commit()?;
    info!("teaching-stats schema upgraded");
    Ok(())
}

/// Copies every archival `answer_all` row into the live answer table, adds
/// a locally-unique surrogate key, and clears the operational tables.
///
/// The copied rows keep their original evaluation ids: they are NOT
/// renumbered against the importer's max()+1 sequence, so a later import
/// can be assigned ids that already exist among the copied rows. Known
/// gap, kept for compatibility with the other legacy consumers.
pub fn consolidate_legacy_source(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "INSERT INTO answer({ANSWER_COLUMNS}) SELECT {ANSWER_COLUMNS} FROM answer_all;
        ALTER TABLE answer ADD COLUMN id INTEGER;
        UPDATE answer SET id = rowid;
        CREATE UNIQUE INDEX answer_id_idx ON answer(id);
        DELETE FROM forms_answer;
        DELETE FROM forms_participation;
        DELETE FROM forms_evaluation;"
    ))?;
    tx.commit()?;
    info!("legacy answers consolidated into the answer table");
    Ok(())
}

/// SQLite has no `ALTER VIEW ... RENAME`: recreate the stored body under
/// the new name, then drop the old view. Fails with `QueryReturnedNoRows`
/// when the source view is gone, which is exactly what an already-upgraded
/// schema produces.
fn rename_view(tx: &Transaction, from: &str, to: &str) -> Result<()> {
    let sql: String = tx.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'view' AND name = ?",
        [from],
        |row| row.get(0),
    )?;

    // The stored text is "CREATE VIEW <name> AS <body>"; anchor on the
    // view name to find the AS that separates name from body.
    let upper = sql.to_ascii_uppercase();
    let name_at = upper
        .find(&from.to_ascii_uppercase())
        .ok_or(Error::Persistence(rusqlite::Error::InvalidQuery))?;
    let as_at = upper[name_at + from.len()..]
        .find("AS")
        .map(|i| i + name_at + from.len())
        .ok_or(Error::Persistence(rusqlite::Error::InvalidQuery))?;
    let body = sql[as_at + 2..].trim_start();

    tx.execute_batch(&format!("CREATE VIEW {to} AS {body};\nDROP VIEW {from};"))?;
    Ok(())
}

fn rebuild_table(tx: &Transaction, table: &TableRebuild) -> Result<()> {
    tx.execute_batch(&format!(
        "ALTER TABLE {name} RENAME TO {name}_old;
        {create};
        INSERT INTO {name} {select};
        DROP TABLE {name}_old;",
        name = table.name,
        create = table.create_sql,
        select = table.copy_select,
    ))?;
    Ok(())
}
