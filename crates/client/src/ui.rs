use anyhow::Result;
use augustus_shared::Track;
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::events::ViewEvent;
use crate::model::{ChatMessage, ConversationId, ConversationSummary, Role, Seed};
use crate::orchestrator::{Orchestrator, Panel, SelectOutcome, SendOutcome};
use crate::session::{SessionStatus, post_sign_in_target};
use crate::video;

pub const DEFAULT_VIDEO_QUESTION: &str = "Analyze this video";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Login { username: String, password: String },
    Signup { username: String, email: String, password: String },
    Logout,
    Video { url: String, question: Option<String> },
    General(String),
    Tab(Track),
    New,
    History,
    Open(String),
    Help,
    Quit,
    Send(String),
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Command::Send(line.to_string()));
        };

        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let args = args.trim();
        let words: Vec<&str> = args.split_whitespace().collect();

        let command = match (name, words.as_slice()) {
            ("login", [username, password]) => Command::Login {
                username: username.to_string(),
                password: password.to_string(),
            },
            ("signup", [username, email, password]) => Command::Signup {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            },
            ("logout", []) => Command::Logout,
            ("video", [url, ..]) => {
                let question = args[url.len()..].trim();
                Command::Video {
                    url: url.to_string(),
                    question: (!question.is_empty()).then(|| question.to_string()),
                }
            }
            ("general", [_, ..]) => Command::General(args.to_string()),
            ("tab", ["video"]) => Command::Tab(Track::Video),
            ("tab", ["general"]) => Command::Tab(Track::General),
            ("new", []) => Command::New,
            ("history", []) => Command::History,
            ("open", [id]) => Command::Open(id.to_string()),
            ("help", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            _ => Command::Invalid(line.to_string()),
        };
        Some(command)
    }
}

pub async fn interactive_chat(orchestrator: Arc<Orchestrator>) -> Result<()> {
    let renderer = tokio::spawn(render_events(
        Arc::clone(&orchestrator),
        orchestrator.subscribe(),
    ));

    let session = orchestrator.session().probe().await;
    match session.status {
        SessionStatus::Authenticated => {
            println!("Signed in.");
            if let Some(SelectOutcome::Loaded { messages }) = orchestrator.restore().await {
                println!("Restored your last conversation ({} messages).", messages);
            }
        }
        _ => println!("Not signed in. Use /login USER PASS or /signup USER EMAIL PASS."),
    }
    println!("Augustus chat started. Type /help for commands, /quit to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("[{}] > ", orchestrator.active_track());
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };

        match command {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::Invalid(line) => println!("Unknown command: {} (try /help)", line),
            Command::Login { username, password } => {
                match orchestrator.session().login(&username, &password).await {
                    Ok(state) if state.status == SessionStatus::Authenticated => {
                        println!("Signed in as {}. Continue at {}.", username, post_sign_in_target(None));
                        orchestrator.restore().await;
                    }
                    Ok(_) => println!("Login succeeded but the session could not be verified."),
                    Err(e) => println!("Login failed: {}", e.user_message()),
                }
            }
            Command::Signup { username, email, password } => {
                match orchestrator.session().signup(&username, &email, &password).await {
                    Ok(_) => println!("Account created. Sign in with /login {} <password>.", username),
                    Err(e) => println!("Sign-up failed: {}", e.user_message()),
                }
            }
            Command::Logout => orchestrator.session().sign_out().await,
            Command::Video { url, question } => match video::video_seed(&url) {
                Some(seed) => {
                    let question = question.unwrap_or_else(|| DEFAULT_VIDEO_QUESTION.to_string());
                    report(orchestrator.spawn_submit_intake(Track::Video, seed, question));
                }
                None => println!("That does not look like a YouTube link."),
            },
            Command::General(question) => {
                report(orchestrator.spawn_submit_intake(Track::General, Seed::General, question));
            }
            Command::Tab(track) => orchestrator.switch_track(track),
            Command::New => orchestrator.start_new_conversation(orchestrator.active_track()),
            Command::History => print_conversations(&orchestrator.view().conversations),
            Command::Open(id) => {
                match orchestrator.select_conversation(ConversationId::new(id)).await {
                    SelectOutcome::UnknownConversation => println!("No cached conversation with that id."),
                    SelectOutcome::SignedOut => println!("Please sign in first."),
                    _ => {}
                }
            }
            Command::Send(text) => {
                report(orchestrator.spawn_send(orchestrator.active_track(), text));
            }
        }
    }

    renderer.abort();
    println!("Goodbye!");
    Ok(())
}

/// Print rejections; everything else arrives through view events.
fn report(handle: JoinHandle<SendOutcome>) {
    tokio::spawn(async move {
        match handle.await {
            Ok(SendOutcome::Rejected(reason)) => println!("\n(not sent: {:?})", reason),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "send task failed"),
        }
    });
}

/// Which canonical messages have been printed for the conversation a track currently shows.
#[derive(Default)]
struct PrintedLog {
    tracks: HashMap<Track, (u64, HashSet<String>)>,
}

impl PrintedLog {
    /// Messages not yet printed. A new epoch means a different list, so nothing carries over.
    fn unseen<'a>(&mut self, track: Track, epoch: u64, messages: &'a [ChatMessage]) -> Vec<&'a ChatMessage> {
        let (seen_epoch, seen) = self.tracks.entry(track).or_default();
        if *seen_epoch != epoch {
            *seen_epoch = epoch;
            seen.clear();
        }
        messages
            .iter()
            .filter(|message| !message.id.is_provisional())
            .filter(|message| seen.insert(message.id.to_string()))
            .collect()
    }
}

async fn render_events(orchestrator: Arc<Orchestrator>, rx: broadcast::Receiver<ViewEvent>) {
    let mut printed = PrintedLog::default();
    let mut stream = BroadcastStream::new(rx);

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "view events lagged");
                continue;
            }
        };

        match event {
            ViewEvent::MessagesChanged { track } => {
                let (epoch, messages) = orchestrator.transcript(track);
                for message in printed.unseen(track, epoch, &messages) {
                    print_message(track, message);
                }
            }
            ViewEvent::PanelChanged { track } if track == orchestrator.active_track() => {
                match orchestrator.view().panel {
                    Panel::IntakeForm => match track {
                        Track::Video => println!("\nPaste a YouTube link: /video URL [question]"),
                        Track::General => println!("\nAsk across all videos: /general QUESTION"),
                    },
                    Panel::Empty => println!("\nNo conversation yet."),
                    Panel::Chat => {}
                }
            }
            ViewEvent::Banner { message } => eprintln!("\n! {}", message),
            ViewEvent::Navigate { to } => println!("\n-> {}", to),
            ViewEvent::SessionChanged { status } => {
                if status == SessionStatus::Unauthenticated {
                    println!("\nSigned out.");
                }
            }
            _ => {}
        }
    }
}

fn print_message(track: Track, message: &ChatMessage) {
    let who = match message.role {
        Role::Human => "You",
        Role::Ai => "Augustus",
        Role::System => "System",
        Role::Tool => "Tool",
    };
    match &message.tool_name {
        Some(tool) => println!("\n[{}] {} ({}): {}", track, who, tool, message.content),
        None => println!("\n[{}] {}: {}", track, who, message.content),
    }
}

pub fn print_conversations(conversations: &[ConversationSummary]) {
    if conversations.is_empty() {
        println!("No conversations yet.");
        return;
    }
    for summary in conversations {
        println!(
            "{}  [{}] {} ({} messages, {})",
            summary.conversation_id,
            summary.track(),
            summary.title,
            summary.message_count,
            summary.last_message_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(last) = &summary.last_user_message {
            println!("    > {}", last);
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /login USER PASS           Sign in");
    println!("  /signup USER EMAIL PASS    Create an account");
    println!("  /logout                    Sign out");
    println!("  /video URL [question]      Start a video conversation");
    println!("  /general QUESTION          Start a general conversation");
    println!("  /tab video|general         Switch tab");
    println!("  /new                       New conversation on this tab");
    println!("  /history                   List conversations on this tab");
    println!("  /open ID                   Reopen a conversation");
    println!("  /quit                      Exit");
    println!("Anything else is sent on the active tab.");
}
