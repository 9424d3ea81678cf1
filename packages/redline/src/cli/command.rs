//! Slash-command parsing for the interactive session.

use crate::protocol::QuestionAnswer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text: a user turn.
    Message(String),
    Apply(String),
    Reject(String),
    Answer { question_id: String, answer: String },
    AnswerAll(Vec<QuestionAnswer>),
    Stop,
    Reconnect,
    Reset,
    Patches,
    Plan,
    Questions,
    Preview,
    Save,
    Restore,
    Submit,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
Type a message to send it, or use a command:
  /apply <patch>                 accept a draft patch
  /reject <patch>                discard a draft patch
  /answer <question> <text>      answer one question
  /answer-all q1=text | q2=text  answer several questions at once
  /stop                          ask the server to stop generating
  /reconnect                     reconnect, keeping the conversation and drafts
  /reset                         drop all patches, back to the original text
  /patches  /plan  /questions  /preview
  /save  /restore                local draft snapshot
  /submit                        write the current text back to the document
  /quit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Message(line.to_string())));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "apply" => Command::Apply(single_arg(args, "/apply <patch_id>")?),
        "reject" => Command::Reject(single_arg(args, "/reject <patch_id>")?),
        "answer" => {
            const USAGE: &str = "/answer <question_id> <text>";
            let (question_id, answer) = args
                .split_once(char::is_whitespace)
                .ok_or(CommandError::Usage(USAGE))?;
            let answer = answer.trim();
            if answer.is_empty() {
                return Err(CommandError::Usage(USAGE));
            }
            Command::Answer {
                question_id: question_id.to_string(),
                answer: answer.to_string(),
            }
        }
        "answer-all" => Command::AnswerAll(parse_answers(args)?),
        "stop" => Command::Stop,
        "reconnect" => Command::Reconnect,
        "reset" => Command::Reset,
        "patches" => Command::Patches,
        "plan" => Command::Plan,
        "questions" => Command::Questions,
        "preview" => Command::Preview,
        "save" => Command::Save,
        "restore" => Command::Restore,
        "submit" => Command::Submit,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn single_arg(args: &str, usage: &'static str) -> Result<String, CommandError> {
    if args.is_empty() || args.contains(char::is_whitespace) {
        return Err(CommandError::Usage(usage));
    }
    Ok(args.to_string())
}

fn parse_answers(args: &str) -> Result<Vec<QuestionAnswer>, CommandError> {
    const USAGE: &str = "/answer-all <question_id>=<text> | <question_id>=<text>";
    let answers = args
        .split('|')
        .map(|pair| {
            let (id, answer) = pair.split_once('=').ok_or(CommandError::Usage(USAGE))?;
            let (id, answer) = (id.trim(), answer.trim());
            if id.is_empty() || answer.is_empty() {
                return Err(CommandError::Usage(USAGE));
            }
            Ok(QuestionAnswer {
                question_id: id.to_string(),
                answer: answer.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(answers)
}
