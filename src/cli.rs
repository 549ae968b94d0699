//! Line-oriented terminal front end
//!
//! Plain lines are prompt edits; lines starting with `/` are commands.
//! Generation runs as a spawned task so input keeps flowing while a request
//! is in flight; outcomes and voice events come back through the same
//! `select!` loop.

use crate::clipboard::copy_to_clipboard;
use crate::collection::Toggled;
use crate::export::{self, ExportError};
use crate::model::{GenerationRecord, OutputBundle};
use crate::orchestrator::SubmitOutcome;
use crate::session::{HydrateOutcome, Session};
use crate::voice::{VoiceEvent, VoiceToggle};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const HELP: &str = "\
Type a prompt, then /generate.

  /generate      generate from the current prompt
  /regen         generate again from the same prompt
  /show          show the current output
  /history       list recent generations
  /favorites     list favorites
  /fav <n>       toggle favorite for history entry n
  /unfav <n>     remove favorites entry n
  /share         copy a share link for the current output
  /open <url>    open a share link
  /copy          copy the current output
  /export        save the current output to a text file
  /thumbnail     save the thumbnail text to a file
  /copythumb     copy the thumbnail text
  /whatsapp      share caption and hashtags on WhatsApp
  /whatsthumb    share the thumbnail text on WhatsApp
  /theme         toggle dark mode
  /voice         start or stop voice input
  /help          show this help
  /quit          exit";

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Prompt(String),
    Generate,
    Regenerate,
    Show,
    History,
    Favorites,
    Favorite(usize),
    Unfavorite(usize),
    Share,
    Open(String),
    Copy,
    Export,
    Thumbnail,
    CopyThumbnail,
    WhatsApp,
    WhatsAppThumbnail,
    Theme,
    Voice,
    Help,
    Quit,
    Invalid(String),
}

/// Parse a line; entry numbers are 1-based on screen, 0-based here
pub(crate) fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Prompt(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "generate" | "g" => Command::Generate,
        "regen" | "r" => Command::Regenerate,
        "show" => Command::Show,
        "history" => Command::History,
        "favorites" | "favs" => Command::Favorites,
        "fav" => parse_index(arg).map_or_else(|| usage("/fav <n>"), Command::Favorite),
        "unfav" => parse_index(arg).map_or_else(|| usage("/unfav <n>"), Command::Unfavorite),
        "share" => Command::Share,
        "open" if !arg.is_empty() => Command::Open(arg.to_string()),
        "open" => usage("/open <url>"),
        "copy" => Command::Copy,
        "export" => Command::Export,
        "thumbnail" => Command::Thumbnail,
        "copythumb" => Command::CopyThumbnail,
        "whatsapp" => Command::WhatsApp,
        "whatsthumb" => Command::WhatsAppThumbnail,
        "theme" => Command::Theme,
        "voice" | "v" => Command::Voice,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Invalid(format!("Unknown command /{}, try /help", other)),
    }
}

fn parse_index(arg: &str) -> Option<usize> {
    arg.parse::<usize>().ok()?.checked_sub(1)
}

fn usage(text: &str) -> Command {
    Command::Invalid(format!("Usage: {}", text))
}

/// Run the interactive loop until `/quit` or end of input
pub(crate) async fn run(mut session: Session) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut voice_events = session.voice_events();
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

    println!("Shortgen - AI shorts generator. /help for commands.");
    info!(
        dark_mode = session.dark_mode(),
        "Interactive session started"
    );
    if session.current_bundle().is_some() {
        print_bundle(&session);
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("End of input");
                    break;
                };
                match parse_command(&line) {
                    Command::Quit => break,
                    command => handle_command(&mut session, command, &outcome_tx),
                }
            }
            Some(outcome) = outcome_rx.recv() => {
                print_outcome(&session, outcome);
            }
            event = voice_events.recv() => match event {
                Ok(event) => print_voice_event(event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed voice events"),
                Err(RecvError::Closed) => {}
            }
        }
    }

    Ok(())
}

fn handle_command(
    session: &mut Session,
    command: Command,
    outcome_tx: &mpsc::UnboundedSender<SubmitOutcome>,
) {
    match command {
        Command::Prompt(text) => {
            if !text.trim().is_empty() {
                session.edit_prompt(text);
            }
        }
        Command::Generate => {
            if session.is_loading() {
                println!("Already generating, please wait.");
                return;
            }
            if session.prompt().trim().is_empty() && !session.has_pending_edit() {
                println!("Enter a prompt first.");
                return;
            }
            spawn_submit(session.generate(), outcome_tx);
            println!("Generating...");
        }
        Command::Regenerate => {
            if session.prompt().trim().is_empty() {
                println!("Nothing to regenerate yet.");
                return;
            }
            spawn_submit(session.regenerate(), outcome_tx);
            println!("Regenerating...");
        }
        Command::Show => print_bundle(session),
        Command::History => print_records("History", &session.history(), session),
        Command::Favorites => {
            let favorites = session.favorites().to_vec();
            print_records("Favorites", &favorites, session);
        }
        Command::Favorite(index) => match session.toggle_favorite_from_history(index) {
            Some(Toggled::Added) => println!("Added to favorites."),
            Some(Toggled::Removed) => println!("Removed from favorites."),
            None => println!("No history entry {}.", index + 1),
        },
        Command::Unfavorite(index) => match session.toggle_favorite_entry(index) {
            Some(_) => println!("Removed from favorites."),
            None => println!("No favorites entry {}.", index + 1),
        },
        Command::Share => match session.share_link() {
            Some(link) => {
                println!("{}", link);
                if copy_to_clipboard(link.as_str()) {
                    println!("Link copied to clipboard!");
                }
            }
            None => println!("Nothing to share yet."),
        },
        Command::Open(link) => match session.hydrate(&link) {
            HydrateOutcome::Hydrated => print_bundle(session),
            HydrateOutcome::Fallback(e) => {
                println!("That share link is invalid ({}).", e);
                print_bundle(session);
            }
            HydrateOutcome::NotShareLink => println!("Not a share link: {}", link),
        },
        Command::Copy => with_bundle(session, |bundle| {
            if copy_to_clipboard(&export::format_output(bundle)) {
                println!("Copied to clipboard!");
            } else {
                println!("Could not copy to clipboard.");
            }
        }),
        Command::Export => with_bundle(session, |bundle| {
            report_export(|dir| export::save_output(dir, bundle))
        }),
        Command::Thumbnail => with_bundle(session, |bundle| {
            report_export(|dir| export::save_thumbnail_text(dir, bundle))
        }),
        Command::CopyThumbnail => with_bundle(session, |bundle| {
            if bundle.thumbnail_text.trim().is_empty() {
                println!("No thumbnail text yet.");
            } else if copy_to_clipboard(&bundle.thumbnail_text) {
                println!("Thumbnail text copied!");
            } else {
                println!("Could not copy to clipboard.");
            }
        }),
        Command::WhatsApp => with_bundle(session, |bundle| {
            open_whatsapp(export::whatsapp_share_url(bundle))
        }),
        Command::WhatsAppThumbnail => with_bundle(session, |bundle| {
            open_whatsapp(export::thumbnail_whatsapp_url(bundle))
        }),
        Command::Theme => {
            let dark = session.toggle_dark_mode();
            println!("Dark mode {}.", if dark { "on" } else { "off" });
        }
        Command::Voice => match session.toggle_voice() {
            VoiceToggle::Started | VoiceToggle::Stopped => {}
            VoiceToggle::Unsupported => {
                println!("Speech recognition is not supported here.")
            }
        },
        Command::Help => println!("{}", HELP),
        Command::Invalid(message) => println!("{}", message),
        Command::Quit => {}
    }
}

fn spawn_submit(
    submit: impl Future<Output = SubmitOutcome> + Send + 'static,
    outcome_tx: &mpsc::UnboundedSender<SubmitOutcome>,
) {
    let outcome_tx = outcome_tx.clone();
    tokio::spawn(async move {
        let _ = outcome_tx.send(submit.await);
    });
}

fn report_export(save: impl FnOnce(&Path) -> Result<PathBuf, ExportError>) {
    let result = export::exports_dir()
        .ok_or(ExportError::NoDocumentsDir)
        .and_then(|dir| save(&dir));
    match result {
        Ok(path) => println!("Saved to {}", path.display()),
        Err(e) => println!("Export failed: {}", e),
    }
}

fn open_whatsapp(link: Result<url::Url, url::ParseError>) {
    match link {
        Ok(url) => {
            println!("Opening WhatsApp...");
            if let Err(e) = open::that(url.as_str()) {
                error!("Failed to open WhatsApp link: {}", e);
                println!("{}", url);
            }
        }
        Err(e) => error!("Failed to build WhatsApp link: {}", e),
    }
}

fn with_bundle(session: &Session, action: impl FnOnce(&OutputBundle)) {
    match session.current_bundle() {
        Some(bundle) => action(&bundle),
        None => println!("Nothing generated yet."),
    }
}

fn print_outcome(session: &Session, outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::Succeeded(_) => {
            println!("Content generated!");
            print_bundle(session);
        }
        SubmitOutcome::Failed(e) => println!("Generation failed: {}. Try again.", e),
        SubmitOutcome::Busy => println!("Already generating, please wait."),
    }
}

fn print_bundle(session: &Session) {
    let Some(bundle) = session.current_bundle() else {
        println!("Nothing generated yet.");
        return;
    };
    let thumbnail = if bundle.thumbnail_text.trim().is_empty() {
        OutputBundle::fallback().thumbnail_text
    } else {
        bundle.thumbnail_text.clone()
    };
    println!();
    println!("{}", export::format_output(&bundle));
    println!();
    println!("Thumbnail:\n{}", thumbnail);
    println!();
}

fn print_records(title: &str, records: &[GenerationRecord], session: &Session) {
    if records.is_empty() {
        println!("{}: empty", title);
        return;
    }
    println!("{}:", title);
    for (index, record) in records.iter().enumerate() {
        println!("{}", format_record(index, record, session.is_favorite(record)));
    }
}

/// One list entry; favorites are starred
fn format_record(index: usize, record: &GenerationRecord, favorite: bool) -> String {
    let star = if favorite { '*' } else { ' ' };
    let mut entry = format!(
        "{:>3}. {} {}  Prompt: {}\n       Caption: {}\n       Hashtags: {}\n       Thumbnail: {}",
        index + 1,
        star,
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.prompt,
        record.bundle.caption,
        record.bundle.hashtags,
        record.bundle.thumbnail_text
    );
    if !record.tags.is_empty() {
        entry.push_str("\n       Tags: ");
        entry.push_str(&record.tags.join(" "));
    }
    entry
}

fn print_voice_event(event: VoiceEvent) {
    match event {
        VoiceEvent::Listening => println!("Listening..."),
        VoiceEvent::Captured { transcript } => println!("Heard: {}", transcript),
        VoiceEvent::Error { message } => println!("Voice input failed: {}", message),
        VoiceEvent::Stopped => println!("Stopped listening."),
    }
}
