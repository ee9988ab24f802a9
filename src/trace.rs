use std::{
    collections::VecDeque,
    fmt, fs,
    io::{self, BufRead, BufReader},
    mem,
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};
use xz2::read::XzDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Read,
    Write,
}

impl Op {
    fn parse(token: &str) -> Option<Op> {
        match token {
            "R" => Some(Op::Read),
            "W" => Some(Op::Write),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Read => write!(f, "R"),
            Op::Write => write!(f, "W"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Access {
    pub op: Op,
    pub address: u64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatErrorKind {
    #[error("expected operation R or W, found {0:?}")]
    BadOperation(String),
    #[error("invalid hex address {0:?}")]
    BadAddress(String),
    #[error("operation without an address at end of trace")]
    Truncated,
    #[error("line is not valid UTF-8")]
    Encoding,
}

#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    #[error("cannot open trace {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed trace record {record} on line {line}: {kind}")]
    Format {
        record: usize,
        line: usize,
        kind: FormatErrorKind,
    },
}

fn parse_address(token: &str) -> Option<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    // from_str_radix accepts a leading sign
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Decodes `<op> <address>` records from whitespace separated text.
///
/// Line breaks carry no meaning beyond separating tokens. Decoding stops at
/// the first malformed record, a lone trailing operation included.
pub struct TraceParser<R> {
    reader: R,
    line: Vec<u8>,
    line_no: usize,
    tokens: VecDeque<String>,
    record: usize,
    done: bool,
}

impl<R: BufRead> TraceParser<R> {
    pub fn new(reader: R) -> Self {
        TraceParser {
            reader,
            line: Vec::new(),
            line_no: 0,
            tokens: VecDeque::new(),
            record: 0,
            done: false,
        }
    }

    /// `record` is the record the next token belongs to, for error reports.
    fn next_token(&mut self, record: usize) -> Result<Option<(String, usize)>, TraceError> {
        loop {
            if let Some(token) = self.tokens.pop_front() {
                return Ok(Some((token, self.line_no)));
            }
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let Ok(text) = std::str::from_utf8(&self.line) else {
                return Err(TraceError::Format {
                    record,
                    line: self.line_no,
                    kind: FormatErrorKind::Encoding,
                });
            };
            self.tokens.extend(text.split_whitespace().map(str::to_owned));
        }
    }

    fn format_error(&self, line: usize, kind: FormatErrorKind) -> TraceError {
        TraceError::Format {
            record: self.record,
            line,
            kind,
        }
    }

    fn next_record(&mut self) -> Result<Option<Access>, TraceError> {
        let Some((op_token, op_line)) = self.next_token(self.record + 1)? else {
            return Ok(None);
        };
        self.record += 1;
        let Some(op) = Op::parse(&op_token) else {
            return Err(self.format_error(op_line, FormatErrorKind::BadOperation(op_token)));
        };
        let Some((addr_token, addr_line)) = self.next_token(self.record)? else {
            return Err(self.format_error(op_line, FormatErrorKind::Truncated));
        };
        match parse_address(&addr_token) {
            Some(address) => Ok(Some(Access { op, address })),
            None => Err(self.format_error(addr_line, FormatErrorKind::BadAddress(addr_token))),
        }
    }
}

impl<R: BufRead> Iterator for TraceParser<R> {
    type Item = Result<Access, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(access)) => Some(Ok(access)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// A trace decoded on a background thread and handed over in blocks.
pub struct Trace {
    pub rec: Receiver<Result<Vec<Access>, TraceError>>,
    _thread: JoinHandle<()>,
}

impl Trace {
    /// Opens a text trace, decompressing it first if the file ends in `.xz`.
    pub fn open(
        path: &Path,
        entries_per_block: usize,
        blocks_per_queue: usize,
    ) -> Result<Trace, TraceError> {
        let stream = fs::File::open(path).map_err(|source| TraceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let reader: Box<dyn BufRead + Send> = match path.extension() {
            Some(ext) if ext == "xz" => Box::new(BufReader::new(XzDecoder::new(stream))),
            _ => Box::new(BufReader::new(stream)),
        };
        log::debug!("opened trace {}", path.display());
        Ok(Trace::from_reader(reader, entries_per_block, blocks_per_queue))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(
        reader: R,
        entries_per_block: usize,
        blocks_per_queue: usize,
    ) -> Trace {
        let entries_per_block = entries_per_block.max(1);
        let (sender, receiver) = crossbeam::channel::bounded(blocks_per_queue);

        let t = thread::spawn(move || {
            Trace::run_thread(TraceParser::new(reader), entries_per_block, sender)
        });

        Trace {
            rec: receiver,
            _thread: t,
        }
    }

    fn run_thread<R: BufRead>(
        parser: TraceParser<R>,
        entries_per_block: usize,
        queue: Sender<Result<Vec<Access>, TraceError>>,
    ) {
        let mut buffer = Vec::with_capacity(entries_per_block);
        for entry in parser {
            match entry {
                Ok(access) => {
                    buffer.push(access);
                    if buffer.len() == entries_per_block {
                        let full = mem::replace(&mut buffer, Vec::with_capacity(entries_per_block));
                        if queue.send(Ok(full)).is_err() {
                            // receiver hung up
                            return;
                        }
                    }
                }
                Err(err) => {
                    if !buffer.is_empty() && queue.send(Ok(mem::take(&mut buffer))).is_err() {
                        return;
                    }
                    let _ = queue.send(Err(err));
                    return;
                }
            }
        }
        if !buffer.is_empty() {
            let _ = queue.send(Ok(buffer));
        }
    }

    /// Blocks in trace order, ending when the stream is exhausted.
    pub fn blocks(&self) -> impl Iterator<Item = Result<Vec<Access>, TraceError>> + '_ {
        self.rec.iter()
    }
}
