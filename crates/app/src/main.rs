use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use services::{
    BackendConfig, Clock, CoursePlayer, EngineConfig, HttpBackend, IdentityProvider, PlayerDeps,
    StaticIdentity,
};
use storage::Storage;
use tracing::debug;
use zenith_core::model::LessonKey;

#[derive(Debug, Parser)]
#[command(name = "zenith", about = "Play a Zenith course from the terminal")]
struct Cli {
    /// Local progress cache.
    #[arg(
        long,
        global = true,
        env = "ZENITH_CACHE_DB",
        default_value = "sqlite://zenith-cache.sqlite3"
    )]
    db: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the unlock table and where the course resumes.
    Status {
        #[arg(long)]
        course: String,
    },
    /// Take the quiz of one lesson, reading one answer per line from stdin.
    Quiz {
        #[arg(long)]
        course: String,
        /// Zero-based week; defaults to the resume point.
        #[arg(long, requires = "lesson")]
        week: Option<usize>,
        /// Zero-based lesson within the week.
        #[arg(long, requires = "week")]
        lesson: Option<usize>,
    },
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_owned();
    }
    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

// The cache file itself is created on connect; its directory is not.
fn ensure_cache_dir(db_url: &str) -> anyhow::Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid --db value: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

async fn deps(db: &str) -> anyhow::Result<PlayerDeps> {
    let db_url = normalize_sqlite_url(db);
    ensure_cache_dir(&db_url)?;
    let storage = Storage::sqlite(&db_url)
        .await
        .with_context(|| format!("opening cache at {db_url}"))?;
    debug!(db = %db_url, "progress cache ready");

    let identity = Arc::new(StaticIdentity::from_env());
    let user_id = identity.user_id();
    let backend = HttpBackend::new(BackendConfig::from_env()?, identity);
    Ok(PlayerDeps {
        backend: Arc::new(backend),
        storage,
        user_id,
        config: EngineConfig::from_env()?,
        clock: Clock::system(),
    })
}

fn print_status(player: &CoursePlayer) {
    println!("{}", player.course_title());
    for row in player.lessons() {
        let state = match (row.unlocked, row.passed, row.submitted) {
            (false, _, _) => "locked",
            (true, true, _) => "passed",
            (true, false, true) => "failed",
            (true, false, false) => "open",
        };
        let marker = if row.current { ">" } else { " " };
        println!("{marker} {:>3}  {state:<8} {}  {}", row.id.value(), row.key, row.topic);
    }
    println!(
        "resume at {} (highest unlocked {})",
        player.current_id(),
        player.progress().highest_unlocked()
    );
}

// An answer line is either the 1-based option number or the option text.
fn resolve_answer(line: &str, options: &[String]) -> String {
    let line = line.trim();
    line.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i))
        .cloned()
        .unwrap_or_else(|| line.to_owned())
}

async fn take_quiz(player: &mut CoursePlayer, key: Option<LessonKey>) -> anyhow::Result<()> {
    if let Some(key) = key {
        player.select(key).await?;
    }
    player.load_quiz().await?;

    let Some(quiz) = player.quiz().content().cloned() else {
        bail!("no quiz was loaded for lesson {}", player.current_key());
    };
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "Lesson {}: {} questions", player.current_id(), quiz.questions.len())?;
    if let Some(embed) = player.current_video().embed_url() {
        writeln!(stdout, "Watch: {embed}")?;
    }

    let mut lines = io::stdin().lock().lines();
    for (i, question) in quiz.questions.iter().enumerate() {
        writeln!(stdout, "\n{}. {}", i + 1, question.question)?;
        for (n, option) in question.options.iter().enumerate() {
            writeln!(stdout, "   {}) {option}", n + 1)?;
        }
        write!(stdout, "> ")?;
        stdout.flush()?;
        let line = lines.next().transpose()?.unwrap_or_default();
        player.answer(i, resolve_answer(&line, &question.options))?;
    }
    drop(stdout);

    let report = player.submit_quiz().await?;
    println!(
        "\nScore {}/{} (need {})",
        report.grade.score,
        quiz.questions.len(),
        report.required
    );
    println!("{}", report.message);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let deps = deps(&cli.db).await?;
    match cli.command {
        Command::Status { course } => {
            let player = CoursePlayer::open(deps, &course).await?;
            print_status(&player);
            player.close().await;
        }
        Command::Quiz {
            course,
            week,
            lesson,
        } => {
            let mut player = CoursePlayer::open(deps, &course).await?;
            let key = week.zip(lesson).map(|(w, l)| LessonKey::new(w, l));
            let outcome = take_quiz(&mut player, key).await;
            player.close().await;
            outcome?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "app=info,services=info,storage=warn".into()),
        )
        .init();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("{err:#}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_accept_number_or_text() {
        let options = vec!["alpha".to_owned(), "beta".to_owned()];
        assert_eq!(resolve_answer("2", &options), "beta");
        assert_eq!(resolve_answer(" alpha ", &options), "alpha");
        assert_eq!(resolve_answer("9", &options), "9");
        assert_eq!(resolve_answer("0", &options), "0");
    }

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_sqlite_url("sqlite:///tmp/a.db"), "sqlite:///tmp/a.db");
        assert_eq!(normalize_sqlite_url("sqlite:/tmp/b.db"), "sqlite:///tmp/b.db");
    }

    #[test]
    fn quiz_lesson_needs_both_coordinates() {
        assert!(Cli::try_parse_from(["zenith", "quiz", "--course", "Rust", "--week", "1"]).is_err());
        let cli = Cli::try_parse_from([
            "zenith", "quiz", "--course", "Rust", "--week", "1", "--lesson", "0",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Quiz {
                week: Some(1),
                lesson: Some(0),
                ..
            }
        ));
    }
}
