//! One-line command grammar.
//!
//! Mirrors the operation table: `INSERT <pos> <text…>` runs to end of line,
//! `LINK` takes a whitespace-free url token, everything else is fixed-arity
//! integers. Queries and `DISCONNECT` take no arguments. Parse failures are
//! never fatal to a session; the scheduler maps them to
//! `Reject INVALID_POSITION`.

use thiserror::Error;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Query(Query),
    Disconnect,
    Edit(EditCommand),
}

/// Read-side commands answered inline under a document read lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Doc,
    Perm,
    Log,
}

/// The twelve edit shapes. Every variant carries flatten-view byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    Insert { pos: usize, text: String },
    Delete { pos: usize, len: usize },
    Newline { pos: usize },
    Heading { level: u8, pos: usize },
    Bold { start: usize, end: usize },
    Italic { start: usize, end: usize },
    Code { start: usize, end: usize },
    Blockquote { pos: usize },
    OrderedList { pos: usize },
    UnorderedList { pos: usize },
    HorizontalRule { pos: usize },
    Link { start: usize, end: usize, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command line")]
    Empty,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("malformed arguments for {0}")]
    BadArguments(&'static str),
}

/// True for keywords that mutate the document. The permission gate checks
/// the keyword alone, before arguments are parsed, so a read-only user sees
/// `UNAUTHORISED` even for a malformed edit line.
pub fn is_edit_keyword(word: &str) -> bool {
    matches!(
        word,
        "INSERT"
            | "DEL"
            | "NEWLINE"
            | "HEADING"
            | "BOLD"
            | "ITALIC"
            | "CODE"
            | "BLOCKQUOTE"
            | "ORDERED_LIST"
            | "UNORDERED_LIST"
            | "HORIZONTAL_RULE"
            | "LINK"
    )
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (head, rest) = split_word(line);
        if head.is_empty() {
            return Err(ParseError::Empty);
        }
        match head {
            "DOC?" => bare(rest, Command::Query(Query::Doc), "DOC?"),
            "PERM?" => bare(rest, Command::Query(Query::Perm), "PERM?"),
            "LOG?" => bare(rest, Command::Query(Query::Log), "LOG?"),
            "DISCONNECT" => bare(rest, Command::Disconnect, "DISCONNECT"),
            "INSERT" => {
                let (pos_tok, tail) = split_word(rest);
                let pos = index(pos_tok, "INSERT")?;
                let text = tail.trim_start();
                if text.is_empty() {
                    return Err(ParseError::BadArguments("INSERT"));
                }
                Ok(Command::Edit(EditCommand::Insert {
                    pos,
                    text: text.to_string(),
                }))
            }
            "DEL" => {
                let [pos, len] = indices(rest, "DEL")?;
                Ok(Command::Edit(EditCommand::Delete { pos, len }))
            }
            "NEWLINE" => {
                let [pos] = indices(rest, "NEWLINE")?;
                Ok(Command::Edit(EditCommand::Newline { pos }))
            }
            "HEADING" => {
                let [level, pos] = indices(rest, "HEADING")?;
                let level = u8::try_from(level).map_err(|_| ParseError::BadArguments("HEADING"))?;
                Ok(Command::Edit(EditCommand::Heading { level, pos }))
            }
            "BOLD" => {
                let [start, end] = indices(rest, "BOLD")?;
                Ok(Command::Edit(EditCommand::Bold { start, end }))
            }
            "ITALIC" => {
                let [start, end] = indices(rest, "ITALIC")?;
                Ok(Command::Edit(EditCommand::Italic { start, end }))
            }
            "CODE" => {
                let [start, end] = indices(rest, "CODE")?;
                Ok(Command::Edit(EditCommand::Code { start, end }))
            }
            "BLOCKQUOTE" => {
                let [pos] = indices(rest, "BLOCKQUOTE")?;
                Ok(Command::Edit(EditCommand::Blockquote { pos }))
            }
            "ORDERED_LIST" => {
                let [pos] = indices(rest, "ORDERED_LIST")?;
                Ok(Command::Edit(EditCommand::OrderedList { pos }))
            }
            "UNORDERED_LIST" => {
                let [pos] = indices(rest, "UNORDERED_LIST")?;
                Ok(Command::Edit(EditCommand::UnorderedList { pos }))
            }
            "HORIZONTAL_RULE" => {
                let [pos] = indices(rest, "HORIZONTAL_RULE")?;
                Ok(Command::Edit(EditCommand::HorizontalRule { pos }))
            }
            "LINK" => {
                let mut words = rest.split_whitespace();
                let (Some(start), Some(end), Some(url), None) =
                    (words.next(), words.next(), words.next(), words.next())
                else {
                    return Err(ParseError::BadArguments("LINK"));
                };
                let start = index(start, "LINK")?;
                let end = index(end, "LINK")?;
                Ok(Command::Edit(EditCommand::Link {
                    start,
                    end,
                    url: url.to_string(),
                }))
            }
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

/// Leading word of `s` plus whatever follows it.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

fn bare(rest: &str, cmd: Command, name: &'static str) -> Result<Command, ParseError> {
    if rest.trim().is_empty() {
        Ok(cmd)
    } else {
        Err(ParseError::BadArguments(name))
    }
}

fn index(token: &str, cmd: &'static str) -> Result<usize, ParseError> {
    token
        .parse::<usize>()
        .map_err(|_| ParseError::BadArguments(cmd))
}

/// Exactly `N` integer arguments, nothing trailing.
fn indices<const N: usize>(rest: &str, cmd: &'static str) -> Result<[usize; N], ParseError> {
    let mut out = [0usize; N];
    let mut words = rest.split_whitespace();
    for slot in &mut out {
        let token = words.next().ok_or(ParseError::BadArguments(cmd))?;
        *slot = index(token, cmd)?;
    }
    if words.next().is_some() {
        return Err(ParseError::BadArguments(cmd));
    }
    Ok(out)
}
