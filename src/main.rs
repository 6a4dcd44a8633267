use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use teaching_stats::settings::{self, TeachingStatsSettings};
use teaching_stats::{db, import, survey, upgrade};

enum Action {
    Consolidate,
    ImportSurvey(PathBuf, PathBuf),
}

fn main() {
    env_logger::init();

    println!("Teaching Stats (v{})", env!("CARGO_PKG_VERSION"));
    println!();

    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut settings_path = PathBuf::from(settings::DEFAULT_SETTINGS_FILE);
    let mut actions: Vec<Action> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--settings" | "-s" => {
                settings_path = PathBuf::from(arg_value(&args, i + 1, "--settings")?);
                i += 2;
            }
            "--consolidate" | "-c" => {
                actions.push(Action::Consolidate);
                i += 1;
            }
            "--import-survey" | "-i" => {
                let questions = PathBuf::from(arg_value(&args, i + 1, "--import-survey")?);
                let responses = PathBuf::from(arg_value(&args, i + 2, "--import-survey")?);
                actions.push(Action::ImportSurvey(questions, responses));
                i += 3;
            }
            other => bail!("unknown argument '{}'", other),
        }
    }

    let cfg = settings::load(&settings_path)?;
    ensure_upgraded(&cfg)?;

    if actions.is_empty() {
        menu(&cfg)
    } else {
        for action in actions {
            match action {
                Action::Consolidate => consolidate(&cfg)?,
                Action::ImportSurvey(questions, responses) => {
                    import_survey(&cfg, &questions, &responses)?
                }
            }
        }
        Ok(())
    }
}

fn arg_value<'a>(args: &'a [String], at: usize, flag: &str) -> anyhow::Result<&'a str> {
    args.get(at)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing value for '{}'", flag))
}

/// Pre-flight: the reporting schema must be table-based before anything
/// else runs. Offers to run the one-time upgrade when it is not.
fn ensure_upgraded(cfg: &TeachingStatsSettings) -> anyhow::Result<()> {
    let mut conn = db::open_db(&cfg.database)?;
    if upgrade::is_upgraded(&conn)? {
        return Ok(());
    }

    let response = question(
        "The 'teaching-stats' database has not been upgraded yet, perform the necessary changes now? [Y/n]",
        "y",
    );
    if !response.eq_ignore_ascii_case("y") {
        bail!("the program cannot continue against a non-upgraded 'teaching-stats' database");
    }

    print!("Upgrading the 'teaching-stats' database... ");
    io::stdout().flush().ok();
    upgrade::perform_database_upgrade(&mut conn)?;
    println!("OK");
    println!();
    Ok(())
}

fn menu(cfg: &TeachingStatsSettings) -> anyhow::Result<()> {
    loop {
        println!("Please, select an option:");
        println!("   1: Load reporting data from 'teaching-stats'");
        println!("   2: Load reporting data from a survey export");
        println!("   0: Exit");
        println!();

        let line = read_line();
        if line.is_empty() {
            // stdin closed
            return Ok(());
        }
        match line.trim() {
            "0" => return Ok(()),
            "1" => {
                let response = question(
                    "This option will load all the current 'teaching-stats' responses into the \
                     report tables, cleaning the original tables. Do you want to continue? [Y/n]",
                    "y",
                );
                if !response.eq_ignore_ascii_case("y") {
                    println!("Operation cancelled.");
                } else if let Err(e) = consolidate(cfg) {
                    println!("Error: {e:#}");
                }
            }
            "2" => {
                let questions = PathBuf::from(question("Path to the exported questions JSON:", ""));
                let responses = PathBuf::from(question("Path to the exported responses JSON:", ""));
                if let Err(e) = import_survey(cfg, &questions, &responses) {
                    println!("Error: {e:#}");
                }
            }
            _ => println!("Please, select a valid option."),
        }
        println!();
    }
}

fn consolidate(cfg: &TeachingStatsSettings) -> anyhow::Result<()> {
    let mut conn = db::open_db(&cfg.database)?;
    upgrade::consolidate_legacy_source(&mut conn)
        .context("loading the legacy 'teaching-stats' answers")?;
    println!("Legacy answers loaded into the reporting table.");
    Ok(())
}

fn import_survey(
    cfg: &TeachingStatsSettings,
    questions_path: &Path,
    responses_path: &Path,
) -> anyhow::Result<()> {
    let questions: Vec<survey::SurveyQuestion> = serde_json::from_slice(
        &std::fs::read(questions_path)
            .with_context(|| format!("reading {}", questions_path.display()))?,
    )
    .with_context(|| format!("parsing {}", questions_path.display()))?;
    let payload: serde_json::Value = serde_json::from_slice(
        &std::fs::read(responses_path)
            .with_context(|| format!("reading {}", responses_path.display()))?,
    )
    .with_context(|| format!("parsing {}", responses_path.display()))?;

    let records = survey::normalize(&questions, &payload)?;
    let mut conn = db::open_db(&cfg.database)?;
    let written = import::import_answers(&mut conn, records)?;
    println!("Imported {} answer rows.", written);
    Ok(())
}

fn question(text: &str, default: &str) -> String {
    println!("{}", text);
    let response = read_line();
    let trimmed = response.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

fn read_line() -> String {
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
    line
}
