pub mod command;
pub mod render;

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::config::{FileConfig, RedlineConfig};
use crate::connection::{ConnectionManager, ConnectionState, WsConnector};
use crate::credentials::StaticCredentials;
use crate::documents::{DocumentSource, FileDocuments};
use crate::drafts::DraftStore;
use crate::protocol::ServerEvent;
use crate::session::{ApplyOutcome, SessionLink, SessionStore};
use command::{Command, HELP, parse_command};

/// Interactive session over stdin for one document.
pub async fn session_command(
    config: &RedlineConfig,
    fc: FileConfig,
    document_id: &str,
) -> Result<()> {
    let documents = FileDocuments::new(config.documents_dir(&fc));
    let drafts = DraftStore::new(&config.drafts_dir);
    let text = documents
        .load(document_id)
        .with_context(|| format!("Failed to load document {document_id}"))?;

    let manager = ConnectionManager::new(
        WsConnector,
        StaticCredentials::new(fc.auth.token.clone()),
        fc.connection(),
    );
    let mut events = manager.event_stream();
    let mut connection = manager.watch_state();
    let store = SessionStore::new(manager.clone());
    store.initialize(document_id, text);

    if manager.state() == ConnectionState::Disconnected {
        eprintln!("[redline: no auth token configured; set REDLINE_AUTH__TOKEN or [auth] token]");
    }
    println!("{HELP}");

    let ctx = CommandContext {
        store: &store,
        documents: &documents,
        drafts: &drafts,
        document_id,
    };
    let mut printed = 0;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => ctx.run(command),
                    Err(e) => eprintln!("{e}"),
                }
            }
            Some(event) = events.recv() => {
                if let ServerEvent::Streaming(chunk) = &event {
                    print!("{}", chunk.chunk);
                    let _ = std::io::stdout().flush();
                }
                store.handle_event(&event);
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                eprintln!("[redline: {}]", render::connection(state));
            }
        }
        printed = print_new_entries(&store, printed);
    }

    events.close();
    store.disconnect();
    info!(document_id, "session ended");
    Ok(())
}

/// Print the resolved configuration with the token redacted.
pub fn config_command(mut fc: FileConfig) -> Result<()> {
    if fc.auth.token.is_some() {
        fc.auth.token = Some("<redacted>".to_string());
    }
    let rendered = toml::to_string_pretty(&fc).context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

fn print_new_entries<L: SessionLink>(store: &SessionStore<L>, printed: usize) -> usize {
    store.read(|state| {
        for entry in state.messages.iter().skip(printed) {
            println!("{}", render::entry(entry));
        }
        state.messages.len()
    })
}

struct CommandContext<'a, L> {
    store: &'a SessionStore<L>,
    documents: &'a FileDocuments,
    drafts: &'a DraftStore,
    document_id: &'a str,
}

impl<L: SessionLink> CommandContext<'_, L> {
    fn run(&self, command: Command) {
        match command {
            Command::Message(text) => report(self.store.send_message(&text)),
            Command::Answer {
                question_id,
                answer,
            } => report(self.store.answer_question(&question_id, &answer)),
            Command::AnswerAll(answers) => report(self.store.answer_all_questions(answers)),
            Command::Stop => report(self.store.stop_generation()),
            Command::Reconnect => report(self.store.reconnect()),
            Command::Apply(id) => match self.store.apply_patch(&id) {
                ApplyOutcome::Applied | ApplyOutcome::Rejected(_) => {}
                ApplyOutcome::NotFound => eprintln!("No draft patch {id}"),
            },
            Command::Reject(id) => {
                if self.store.reject_patch(&id) {
                    println!("Rejected {id}");
                } else {
                    eprintln!("No draft patch {id}");
                }
            }
            Command::Reset => {
                self.store.reset_all();
                println!("Back to the original text.");
            }
            Command::Patches => println!("{}", self.store.read(render::patches)),
            Command::Plan => println!("{}", self.store.read(|s| render::plan(&s.plan))),
            Command::Questions => println!("{}", self.store.read(render::questions)),
            Command::Preview => {
                println!("{}", render::preview(&self.store.read(|s| s.preview())))
            }
            Command::Save => self.save(),
            Command::Restore => self.restore(),
            Command::Submit => {
                let text = self.store.read(|s| s.current_text.clone());
                match self.documents.submit(self.document_id, &text) {
                    Ok(()) => println!("Submitted {}", self.document_id),
                    Err(e) => eprintln!("Submit failed: {e}"),
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }

    fn save(&self) {
        let Some(snapshot) = self.store.draft_snapshot() else {
            return;
        };
        match self.drafts.save(&snapshot) {
            Ok(path) => println!("Draft saved to {}", path.display()),
            Err(e) => eprintln!("Save failed: {e}"),
        }
    }

    fn restore(&self) {
        let snapshot = match self.drafts.load(self.document_id) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                eprintln!("No saved draft for {}", self.document_id);
                return;
            }
            Err(e) => {
                eprintln!("Restore failed: {e}");
                return;
            }
        };
        if let Err(e) = self.store.restore_draft(snapshot) {
            warn!(document_id = self.document_id, error = %e, "draft restore refused");
            eprintln!("Restore failed: {e}");
        }
    }
}

fn report(result: Result<(), crate::session::SessionError>) {
    if let Err(e) = result {
        eprintln!("{e}");
    }
}
