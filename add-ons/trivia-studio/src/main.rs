//! Trivia Studio (terminal front end)
//!
//! Generates a question set, then runs one live voice round against the real
//! microphone and speakers. Typed lines are forwarded while the round runs:
//! `h` asks for a hint, `q` hangs up, anything else is sent as an answer.

use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trivia_core::{
    find_host, preset_hosts, CoreConfig, Difficulty, GameHistoryEntry, GameStore,
    GeminiQuestionSource, LeaderboardEntry, QuestionSource, RoundSetup, TOPICS,
};
use trivia_live::{
    CpalMicrophone, CpalOutput, GeminiLiveConnector, LiveSession, RoundController, RoundEvent,
    RoundOutcome, RoundReport, SessionConfig,
};

/// Play one live voice trivia round.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "trivia-studio", author, version, about, long_about = None)]
struct Options {
    /// Round topic (any text; see --list for the catalogue)
    #[arg(short, long, default_value = "Sports", value_parser = parse_topic)]
    topic: String,

    /// Easy, Medium or Hard
    #[arg(short, long, default_value = "Medium", value_parser = parse_difficulty)]
    difficulty: Difficulty,

    /// Host id (defaults to the saved default host)
    #[arg(long = "host")]
    host_id: Option<String>,

    /// Name recorded on the leaderboard
    #[arg(short, long, default_value = "Player")]
    player: String,

    /// Print topics, hosts and audio devices, then exit
    #[arg(long)]
    list: bool,
}

fn parse_difficulty(raw: &str) -> Result<Difficulty, String> {
    Difficulty::parse(raw).ok_or_else(|| format!("unknown difficulty: {}", raw))
}

fn parse_topic(raw: &str) -> Result<String, String> {
    let topic = raw.trim();
    if topic.is_empty() {
        return Err("topic must not be empty".to_string());
    }
    Ok(topic.to_string())
}

fn print_catalog() {
    println!("Topics:");
    for topic in TOPICS {
        println!("  {}", topic);
    }
    println!("Hosts:");
    for host in preset_hosts() {
        println!("  {:<12} {} ({}) - {}", host.id, host.name, host.voice_name, host.description);
    }
    match CpalMicrophone::list_input_devices() {
        Ok(devices) => println!("Microphones: {}", devices.join(", ")),
        Err(e) => println!("Microphones: unavailable ({})", e),
    }
    match CpalOutput::list_output_devices() {
        Ok(devices) => println!("Speakers: {}", devices.join(", ")),
        Err(e) => println!("Speakers: unavailable ({})", e),
    }
}

#[tokio::main]
async fn main() {
    let code = run().await;
    // The stdin reader blocks a runtime thread that cannot be cancelled.
    std::process::exit(code);
}

async fn run() -> i32 {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[trivia-studio] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let opts = match Options::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let code = if e.use_stderr() { 2 } else { 0 };
            let _ = e.print();
            return code;
        }
    };
    if opts.list {
        print_catalog();
        return 0;
    }

    let config = match CoreConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[trivia-studio] config error: {}", e);
            return 1;
        }
    };
    let Some(api_key) = CoreConfig::api_key() else {
        eprintln!("[trivia-studio] set GEMINI_API_KEY (or API_KEY) to play");
        return 1;
    };

    // Storage is optional: a locked or unreadable store must not block a round.
    let store = match GameStore::open_path(config.store_path()) {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!(error = %e, "game store unavailable; results will not be saved");
            None
        }
    };
    let settings = store.as_ref().map(|s| s.settings()).unwrap_or_default();

    let host_id = opts.host_id.clone().unwrap_or_else(|| settings.default_host_id.clone());
    let Some(host) = find_host(&host_id, &[]) else {
        eprintln!("[trivia-studio] unknown host '{}' (try --list)", host_id);
        return 1;
    };

    tracing::info!(
        topic = %opts.topic,
        difficulty = opts.difficulty.as_str(),
        host = %host.name,
        "📝 Generating questions"
    );
    let source = GeminiQuestionSource::new(&config.api_base, &api_key, &config.question_model)
        .with_count(config.question_count);
    let round = match source
        .generate_questions(&opts.topic, opts.difficulty)
        .await
        .and_then(|questions| RoundSetup::new(&opts.topic, opts.difficulty, host, questions))
    {
        Ok(round) => Arc::new(round),
        Err(e) => {
            eprintln!("[trivia-studio] could not prepare the round: {}", e);
            return 1;
        }
    };

    let output = match CpalOutput::new(settings.host_volume) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("[trivia-studio] speakers unavailable: {}", e);
            return 1;
        }
    };

    let session_config = Arc::new(SessionConfig::for_round(&round, &config, api_key));
    let (session, controller, mut events) = LiveSession::new(
        session_config,
        Arc::clone(&round),
        Arc::new(GeminiLiveConnector::new()),
        Arc::new(CpalMicrophone::new()),
        Box::new(output),
    );
    let task = tokio::spawn(session.run());
    tokio::spawn(forward_stdin(controller.clone()));

    println!("Type an answer and press enter. 'h' for a hint, 'q' to hang up.");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => show_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; hanging up");
                if controller.stop().is_err() {
                    break;
                }
            }
        }
    }

    match task.await {
        Ok(Ok(report)) => {
            print_summary(&report);
            if let Some(store) = &store {
                persist(store, &round, &opts.player, &report);
            }
            0
        }
        Ok(Err(e)) => {
            eprintln!("[trivia-studio] round failed: {}", e);
            1
        }
        Err(e) => {
            eprintln!("[trivia-studio] session task panicked: {}", e);
            1
        }
    }
}

async fn forward_stdin(controller: RoundController) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        let sent = match line {
            "" => continue,
            "h" | "hint" => controller.request_hint(),
            "q" | "quit" => controller.stop(),
            answer => controller.submit_answer(answer),
        };
        if sent.is_err() {
            break;
        }
    }
}

fn show_event(event: &RoundEvent) {
    match event {
        RoundEvent::StateChanged(state) => tracing::debug!(?state, "session state"),
        RoundEvent::RoundStarted => println!("🎙️  You're live!"),
        RoundEvent::RoundError(message) => println!("❌ {}", message),
        RoundEvent::ReconnectAttempt { attempt, max } => {
            println!("🔄 Connection lost, reconnecting ({}/{})...", attempt, max)
        }
        RoundEvent::HostSpeaking(speaking) => tracing::debug!(speaking, "host speaking"),
        RoundEvent::TranscriptAppended { speaker, text } => tracing::debug!(%speaker, %text, "transcript"),
        RoundEvent::ScoreUpdated { result, stats } => println!(
            "{} {} | streak {} | answered {}",
            if result.user_was_correct { "✅" } else { "✖️" },
            result.question,
            stats.current_streak,
            stats.total_questions_answered
        ),
        RoundEvent::RoundFinished { final_score, results } => {
            println!("🏁 Final score: {} / {}", final_score, results.len())
        }
    }
}

fn print_summary(report: &RoundReport) {
    let label = match report.outcome {
        RoundOutcome::Finished => "Show finished",
        RoundOutcome::Stopped => "Round stopped",
    };
    println!(
        "{}: score {} after {} question(s), {} frame(s) sent, {} dropped, {} reconnect(s)",
        label,
        report.progress.score,
        report.progress.answered(),
        report.frames_sent,
        report.frames_dropped,
        report.reconnects
    );
    for entry in &report.transcript {
        println!("  [{}] {}", entry.speaker, entry.text);
    }
}

fn persist(store: &GameStore, round: &RoundSetup, player: &str, report: &RoundReport) {
    let score = report.progress.score;
    let entry = GameHistoryEntry::now(&round.topic, round.difficulty.as_str(), score, &round.host.name);
    if let Err(e) = store.append_history(entry) {
        tracing::warn!(error = %e, "failed to save game history");
    }
    match store.qualifies(score) {
        Ok(true) => {
            let entry = LeaderboardEntry {
                name: player.to_string(),
                score,
                topic: round.topic.clone(),
                date: chrono::Utc::now().format("%Y-%m-%d").to_string(),
            };
            match store.submit_score(entry) {
                Ok(_) => println!("🏆 New leaderboard entry for {}!", player),
                Err(e) => tracing::warn!(error = %e, "failed to save leaderboard entry"),
            }
        }
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "failed to read leaderboard"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[&str]) -> Result<Options, clap::Error> {
        Options::try_parse_from(std::iter::once("trivia-studio").chain(raw.iter().copied()))
    }

    #[test]
    fn defaults_without_arguments() {
        let opts = parse(&[]).unwrap();
        assert_eq!(opts.topic, "Sports");
        assert_eq!(opts.difficulty, Difficulty::Medium);
        assert_eq!(opts.host_id, None);
        assert_eq!(opts.player, "Player");
        assert!(!opts.list);
    }

    #[test]
    fn flags_are_parsed() {
        let opts = parse(&["--topic", "Space", "-d", "Hard", "--host", "professor", "-p", "Ada", "--list"]).unwrap();
        assert_eq!(opts.topic, "Space");
        assert_eq!(opts.difficulty, Difficulty::Hard);
        assert_eq!(opts.host_id.as_deref(), Some("professor"));
        assert_eq!(opts.player, "Ada");
        assert!(opts.list);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse(&["--difficulty", "Impossible"]).is_err());
        assert!(parse(&["--topic"]).is_err());
        assert!(parse(&["--topic", "  "]).is_err());
        assert!(parse(&["--volume", "3"]).is_err());
    }

    #[test]
    fn help_is_generated() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(err.to_string().contains("--difficulty"));
    }
}
