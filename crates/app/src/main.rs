use std::fmt;
use std::path::PathBuf;

use quiz_core::model::QuestionSequence;
use services::{AppServices, Clock, PracticeConfig, load_sequence};
use tracing_subscriber::EnvFilter;

mod repl;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- play      [--db <sqlite_url>] [--questions <file.json>]");
    eprintln!("                                [--question-dir <dir>] [--stack-url <url>]");
    eprintln!("  cargo run -p app -- questions [--questions <file.json>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:quiz.sqlite3");
    eprintln!("  built-in question sequence when --questions is omitted");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_QUESTIONS, QUIZ_QUESTION_DIR, QUIZ_STACK_URL");
    eprintln!("  QUIZ_AI_API_KEY, QUIZ_AI_BASE_URL, QUIZ_AI_MODEL, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    Questions,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "play" => Some(Self::Play),
            "questions" => Some(Self::Questions),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    questions: Option<PathBuf>,
    practice: PracticeConfig,
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = non_empty_env("QUIZ_DB_URL")
            .map_or_else(|| normalize_sqlite_url("quiz.sqlite3".into()), normalize_sqlite_url);
        let mut questions = non_empty_env("QUIZ_QUESTIONS").map(PathBuf::from);
        let mut practice = PracticeConfig {
            question_dir: non_empty_env("QUIZ_QUESTION_DIR").map(PathBuf::from),
            stack_url: non_empty_env("QUIZ_STACK_URL"),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--questions" => {
                    questions = Some(PathBuf::from(require_value(args, "--questions")?));
                }
                "--question-dir" => {
                    practice.question_dir =
                        Some(PathBuf::from(require_value(args, "--question-dir")?));
                }
                "--stack-url" => {
                    practice.stack_url = Some(require_value(args, "--stack-url")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            questions,
            practice,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn resolve_sequence(
    path: Option<&PathBuf>,
) -> Result<QuestionSequence, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_sequence(path).await?),
        None => Ok(QuestionSequence::builtin()),
    }
}

fn print_sequence(sequence: &QuestionSequence) {
    for (index, question) in sequence.iter().enumerate() {
        let topic = question.topic().unwrap_or("-");
        let difficulty = question.difficulty().map_or("-", |d| d.as_str());
        println!(
            "{:>2}. {}  [{}]  topic={topic} difficulty={difficulty}",
            index + 1,
            question.title(),
            question.file_reference(),
        );
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // No subcommand means play.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Play,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Play,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let sequence = resolve_sequence(parsed.questions.as_ref()).await?;

    match cmd {
        Command::Questions => {
            print_sequence(&sequence);
            Ok(())
        }
        Command::Play => {
            // Open + migrate SQLite at startup; the services stay storage-agnostic.
            prepare_sqlite_file(&parsed.db_url)?;
            let services =
                AppServices::new_sqlite(&parsed.db_url, Clock::system(), &parsed.practice)
                    .await?;
            tracing::info!(
                db = %parsed.db_url,
                questions = sequence.len(),
                "starting practice"
            );
            repl::run(services.practice(), sequence).await
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // Binary glue prints once.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
