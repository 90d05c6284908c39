//! Command table: pipe separated `command | service | characteristic | data`
//!
//! ```text
//! # lock commands captured with scan
//! Open          | 1800 (generic access) | 2a00 | 01
//! Close         | 1800                  | 2a00 | 00
//! GetChallenge  | fff0                  | fff1 |
//! SendResponse  | fff0                  | fff2 |
//! SyncSubscribe | fff0                  | fff3 |
//! SyncWrite     | fff0                  | fff4 | a1b2
//! ```
//!
//! Anything after the first whitespace inside a field is a free-form
//! description and is dropped. One entry is kept per command: a later line for
//! the same command replaces the earlier one.

use std::collections::BTreeMap;
use std::fmt;

use crate::hex::{HexError, decode_hex};

/// Number of `|` separated fields on every table line
const FIELDS: usize = 4;

/// Table-level operation names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionTag {
    Open,
    Close,
    SyncSubscribe,
    SyncWrite,
    GetChallenge,
    SendResponse,
}

impl ActionTag {
    pub const ALL: [ActionTag; 6] = [
        ActionTag::Open,
        ActionTag::Close,
        ActionTag::SyncSubscribe,
        ActionTag::SyncWrite,
        ActionTag::GetChallenge,
        ActionTag::SendResponse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionTag::Open => "Open",
            ActionTag::Close => "Close",
            ActionTag::SyncSubscribe => "SyncSubscribe",
            ActionTag::SyncWrite => "SyncWrite",
            ActionTag::GetChallenge => "GetChallenge",
            ActionTag::SendResponse => "SendResponse",
        }
    }

    /// Exact, case-sensitive match on the first table field
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.name() == name)
    }

    /// Whether the table line must supply the bytes to write
    pub fn carries_payload(self) -> bool {
        matches!(self, ActionTag::Open | ActionTag::Close | ActionTag::SyncWrite)
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// One compiled table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub operation: ActionTag,
    pub service_id: String,
    pub characteristic_id: String,
    pub payload_hex: Option<String>,
    pub write_mode: WriteMode,
}

impl Entry {
    /// Payload bytes; empty when the row carries none
    pub fn payload(&self) -> Result<Vec<u8>, HexError> {
        match &self.payload_hex {
            Some(hex) => decode_hex(hex),
            None => Ok(Vec::new()),
        }
    }
}

/// At most one [`Entry`] per [`ActionTag`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTable {
    entries: BTreeMap<ActionTag, Entry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the one it replaces (last line wins)
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        self.entries.insert(entry.operation, entry)
    }

    pub fn get(&self, tag: ActionTag) -> Option<&Entry> {
        self.entries.get(&tag)
    }

    pub fn contains(&self, tag: ActionTag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    /// 1-based
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("expected 4 `|` separated fields, found {0}")]
    FieldCount(usize),
    #[error("{tag} has an empty {field} id")]
    EmptyIdentifier { tag: ActionTag, field: &'static str },
    #[error("{tag} needs a payload to write")]
    MissingPayload { tag: ActionTag },
    #[error("{tag} payload is not hex: {source}")]
    InvalidPayload {
        tag: ActionTag,
        #[source]
        source: HexError,
    },
}

/// Result of compiling a whole table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compiled {
    pub table: CommandTable,
    /// Rejected lines; the rest of the table is still compiled
    pub errors: Vec<ParseError>,
    /// `(line, tag)` for every line that replaced an earlier one
    pub replaced: Vec<(usize, ActionTag)>,
    /// `(line, operation)` for lines naming an unknown operation
    pub ignored: Vec<(usize, String)>,
}

/// Reassembles lines from arbitrarily split chunks
#[derive(Debug, Default)]
pub struct LineAssembler {
    remaining: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.remaining.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(index) = self.remaining.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.remaining.drain(..=index).collect();
            lines.push(to_line(&line[..index]));
        }
        lines
    }

    /// Flush the trailing line that had no terminator
    pub fn finish(&mut self) -> Option<String> {
        if self.remaining.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.remaining);
        Some(to_line(&line))
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Streaming table compiler: feed chunks as they are read, then finish
#[derive(Debug, Default)]
pub struct TableCompiler {
    assembler: LineAssembler,
    line: usize,
    compiled: Compiled,
}

impl TableCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        for line in self.assembler.push(chunk) {
            self.compile_line(&line);
        }
    }

    pub fn finish(mut self) -> Compiled {
        if let Some(line) = self.assembler.finish() {
            self.compile_line(&line);
        }
        self.compiled
    }

    fn compile_line(&mut self, line: &str) {
        self.line += 1;
        match parse_line(line) {
            Ok(Parsed::Entry(entry)) => {
                let tag = entry.operation;
                if self.compiled.table.insert(entry).is_some() {
                    self.compiled.replaced.push((self.line, tag));
                }
            }
            Ok(Parsed::Unknown(operation)) => self.compiled.ignored.push((self.line, operation)),
            Ok(Parsed::Blank) => {}
            Err(kind) => self.compiled.errors.push(ParseError {
                line: self.line,
                kind,
            }),
        }
    }
}

/// Compile a complete table held in memory
pub fn compile(text: &str) -> Compiled {
    let mut compiler = TableCompiler::new();
    compiler.feed(text.as_bytes());
    compiler.finish()
}

enum Parsed {
    Entry(Entry),
    Unknown(String),
    Blank,
}

fn parse_line(line: &str) -> Result<Parsed, ParseErrorKind> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Parsed::Blank);
    }

    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != FIELDS {
        return Err(ParseErrorKind::FieldCount(fields.len()));
    }

    let operation = fields[0].trim();
    let Some(tag) = ActionTag::from_name(operation) else {
        return Ok(Parsed::Unknown(operation.to_string()));
    };

    let service_id = first_word(fields[1]);
    if service_id.is_empty() {
        return Err(ParseErrorKind::EmptyIdentifier { tag, field: "service" });
    }
    let characteristic_id = first_word(fields[2]);
    if characteristic_id.is_empty() {
        return Err(ParseErrorKind::EmptyIdentifier {
            tag,
            field: "characteristic",
        });
    }

    let payload_hex = if tag.carries_payload() {
        let payload = first_word(fields[3]);
        if payload.is_empty() {
            return Err(ParseErrorKind::MissingPayload { tag });
        }
        decode_hex(payload).map_err(|source| ParseErrorKind::InvalidPayload { tag, source })?;
        Some(payload.to_string())
    } else {
        None
    };

    Ok(Parsed::Entry(Entry {
        operation: tag,
        service_id: service_id.to_string(),
        characteristic_id: characteristic_id.to_string(),
        payload_hex,
        write_mode: WriteMode::WithResponse,
    }))
}

/// Field value without its optional trailing description
fn first_word(field: &str) -> &str {
    field.split_whitespace().next().unwrap_or("")
}
