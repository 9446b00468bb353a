mod config;
mod console;
mod prompt_loader;

use crate::config::Config;
use crate::console::{ConsoleCapture, ConsolePlayback};
use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use interview_core::Command;
use interview_core::capture::CaptureSettings;
use interview_core::conversation::SessionConfig;
use interview_core::interviewer::GeminiInterviewer;
use interview_core::playback::PlaybackSettings;
use interview_core::result::{SessionRecord, SessionStatus};
use interview_core::runtime::SessionHandle;
use interview_core::session_state::{InterviewSession, Phase, SessionSnapshot};
use interview_core::store::{JsonFileStore, SessionStore, StoredSession};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::fmt::time::ChronoLocal;

const END_COMMAND: &str = "/end";

#[derive(Parser)]
#[command(version, about = "Practice spoken job interviews with an AI interviewer")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run a practice interview in the terminal
    Practice {
        /// The job role being interviewed for, e.g. "Backend Engineer"
        role: String,
        /// The interview topic, e.g. "Distributed systems"
        topic: String,
        /// How many questions to answer
        #[arg(long, default_value_t = 5)]
        questions: usize,
    },
    /// List past interviews, newest first
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print the stored records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the best-scoring interviews
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    // Logs go to stderr so they never interleave with the interview on stdout.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();
    let store = JsonFileStore::new(&config.store_dir);

    match args.command {
        CliCommand::Practice {
            role,
            topic,
            questions,
        } => practice(&config, &store, role, topic, questions).await,
        CliCommand::History { limit, json } => {
            let mut sessions = store.list().await?;
            sessions.truncate(limit);
            print_sessions(&sessions, json, false)
        }
        CliCommand::Leaderboard { limit, json } => {
            let sessions = store.leaderboard(limit).await?;
            print_sessions(&sessions, json, true)
        }
    }
}

async fn practice(
    config: &Config,
    store: &JsonFileStore,
    role: String,
    topic: String,
    questions: usize,
) -> Result<()> {
    let session_config = SessionConfig::new(role, topic, questions)?;

    // --- 1. Initialize Collaborators ---
    let prompts = prompt_loader::load_prompts(&config.prompts_dir)
        .context("Failed to load interview prompts")?;
    let interviewer = Arc::new(GeminiInterviewer::new(
        config.require_api_key()?,
        config.gemini_model.clone(),
        prompts,
    ));
    tracing::info!("Using Gemini model {}", interviewer.model());
    let capture = Arc::new(ConsoleCapture::new(CaptureSettings::with_language(
        config.language.clone(),
    )));
    let playback = Arc::new(ConsolePlayback::stdout(
        PlaybackSettings {
            language: config.language.clone(),
            ..PlaybackSettings::default()
        },
        config.speech_wpm,
    ));
    tracing::debug!("Interviewer speaks as {}", playback.speaker());

    let session = InterviewSession::new(session_config, interviewer, capture.clone(), playback)
        .with_turn_timeout(config.turn_timeout);
    let started = session.config();
    tracing::info!(
        "Starting {} interview on {} with {} questions",
        started.role,
        started.topic,
        started.total_questions
    );
    tracing::info!("Speech capabilities: {:?}", session.capabilities());
    let handle = SessionHandle::spawn(session);
    let mut snapshots = handle.snapshots();

    // --- 2. Read the keyboard on its own thread ---
    // Blocking stdin inside the runtime would keep it from shutting down.
    let (line_tx, mut line_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read from stdin: {}", e);
                    break;
                }
            }
        }
    });

    print_controls();
    handle.dispatch(Command::Start)?;

    // --- 3. Main Loop ---
    let mut view = ViewState::default();
    let mut input_open = true;
    let mut ending = false;
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    tracing::warn!("Interview session stopped unexpectedly");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                view.render(&snapshot);
                if snapshot.phase == Phase::Finished {
                    break;
                }
            }
            line = line_rx.recv(), if input_open => match line {
                Some(line) => {
                    if line.trim() == END_COMMAND {
                        ending = true;
                    }
                    on_input(&handle, &capture, line.trim()).await?;
                }
                None => {
                    tracing::info!("Input closed, ending the interview");
                    input_open = false;
                    ending = true;
                    handle.end_interview().await?;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                if ending {
                    tracing::info!("Received second Ctrl-C, quitting without saving");
                    return Ok(());
                }
                tracing::info!("Received Ctrl-C, ending the interview...");
                ending = true;
                handle.end_interview().await?;
            }
        }
    }

    // --- 4. Assemble and Save ---
    let session = handle.finish().await?;
    let record = session.result(Utc::now());
    match store.save(&record).await {
        Ok(id) => tracing::info!("Interview saved as {} in {}", id, store.dir().display()),
        Err(e) => tracing::error!("Failed to save interview: {:?}", e),
    }
    print_summary(&record);
    Ok(())
}

/// One line of keyboard input while the interview runs.
async fn on_input(handle: &SessionHandle, capture: &ConsoleCapture, line: &str) -> Result<()> {
    if line == END_COMMAND {
        handle.end_interview().await?;
        return Ok(());
    }

    if !line.is_empty() {
        if !capture.push_line(line) {
            println!("(Press Enter to start answering first.)");
        }
        return Ok(());
    }

    let snapshot = handle.snapshot();
    let command = match snapshot.phase {
        Phase::Idle => Command::Start,
        Phase::Listening if snapshot.listening => Command::StopAndSubmit,
        Phase::Listening => Command::StartListening,
        Phase::Finished => return Ok(()),
        _ => {
            println!("(Please wait, the interviewer is still talking.)");
            return Ok(());
        }
    };
    if let Err(e) = handle.dispatch(command) {
        println!("({e})");
    }
    Ok(())
}

fn print_controls() {
    println!("Press Enter to start answering, type your answer, then press Enter on an");
    println!("empty line to submit it. Type {END_COMMAND} or press Ctrl-C to finish early.");
}

/// Tracks what was already shown so each snapshot only prints what changed.
#[derive(Default)]
struct ViewState {
    phase: Option<Phase>,
    listening: bool,
    error: Option<String>,
}

impl ViewState {
    fn render(&mut self, snapshot: &SessionSnapshot) {
        if snapshot.error != self.error {
            if let Some(error) = &snapshot.error {
                println!("! {error}");
            }
            self.error = snapshot.error.clone();
        }

        if snapshot.listening != self.listening {
            if snapshot.listening {
                println!("[listening] Type your answer, then an empty line to submit.");
            }
            self.listening = snapshot.listening;
        }

        if self.phase == Some(snapshot.phase) {
            return;
        }
        self.phase = Some(snapshot.phase);
        match snapshot.phase {
            Phase::Listening if !snapshot.listening => println!(
                "[question {}/{}] Press Enter when you are ready to answer.",
                snapshot.question_index + 1,
                snapshot.total_questions
            ),
            Phase::Idle if snapshot.error.is_some() => {
                println!("Press Enter to try starting again.")
            }
            Phase::Greeting | Phase::Processing => println!("..."),
            Phase::Evaluating => println!("Wrapping up your interview..."),
            _ => {}
        }
    }
}

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Completed => "completed",
        SessionStatus::EndedEarly => "ended early",
    }
}

fn print_summary(record: &SessionRecord) {
    println!();
    println!("=== {} / {} ===", record.role, record.topic);
    println!(
        "Answered {} of {} questions ({})",
        record.answers.len(),
        record.total_questions,
        status_label(record.status)
    );
    for answer in &record.answers {
        println!();
        println!("Q{}: {}", answer.index + 1, answer.text);
        println!("   score {:.1}/10", answer.evaluation.score);
        if !answer.evaluation.feedback.is_empty() {
            println!("   {}", answer.evaluation.feedback);
        }
    }
    println!();
    println!("Overall score: {}/100", record.overall_score);
}

fn print_sessions(sessions: &[StoredSession], json: bool, ranked: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No interviews saved yet.");
        return Ok(());
    }
    for (position, session) in sessions.iter().enumerate() {
        let record = &session.record;
        let prefix = if ranked {
            format!("{:>3}. ", position + 1)
        } else {
            String::new()
        };
        println!(
            "{}{}  {:>3}/100  {} / {}  ({}, {}/{} answered)  {}",
            prefix,
            record
                .completed_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M"),
            record.overall_score,
            record.role,
            record.topic,
            status_label(record.status),
            record.answers.len(),
            record.total_questions,
            session.id
        );
    }
    Ok(())
}
