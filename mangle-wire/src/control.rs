use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::{trace, warn};

use crate::{lex, Command, WireError};

/// The default maximum length of a control line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// One control line and its parse result.
///
/// A line that fails to parse is still yielded, so that the error can be reported and the
/// stream continues with the next line.
#[derive(Debug)]
pub struct Request {
    /// 1-based line number in the control stream.
    pub line: usize,
    /// The line as received, without its terminator.
    pub text: String,
    pub command: Result<Command, WireError>,
}

enum Line {
    Ready(Request),
    Blank,
    Pending,
}

/// Decodes newline delimited control commands, skipping blank lines and `#` comments.
///
/// Lines longer than the maximum length and lines that are not valid UTF-8 are yielded as
/// malformed requests. Both are consumed, the stream continues after them.
#[derive(Debug)]
pub struct ControlCodec {
    lines: LinesCodec,
    /// Lines consumed so far.
    line: usize,
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self { lines: LinesCodec::new_with_max_length(max_length), line: 0 }
    }

    pub fn max_length(&self) -> usize {
        self.lines.max_length()
    }

    fn malformed(&self, text: String, reason: String) -> Request {
        let line = self.line;
        warn!(line, "{}", reason);
        Request { line, text, command: Err(WireError::Malformed { line, reason }) }
    }

    fn on_line(&mut self, next: Result<Option<String>, LinesCodecError>) -> Result<Line, WireError> {
        let text = match next {
            Ok(Some(text)) => text,
            Ok(None) => return Ok(Line::Pending),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                self.line += 1;
                let reason = format!("line exceeds {} bytes", self.max_length());
                return Ok(Line::Ready(self.malformed(String::new(), reason)));
            }
            // The offending line has already been consumed.
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                self.line += 1;
                return Ok(Line::Ready(self.malformed(String::new(), e.to_string())));
            }
            Err(LinesCodecError::Io(e)) => return Err(e.into()),
        };

        self.line += 1;
        if lex::is_blank(&text) {
            return Ok(Line::Blank);
        }

        let line = self.line;
        trace!(line, text, "decoded control line");

        let command = lex::tokenize(&text)
            .and_then(|tokens| Command::parse(&tokens))
            .map_err(|reason| WireError::Malformed { line, reason });

        Ok(Line::Ready(Request { line, text: text.trim().to_string(), command }))
    }
}

impl Decoder for ControlCodec {
    type Item = Request;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let next = self.lines.decode(src);
            match self.on_line(next)? {
                Line::Ready(request) => return Ok(Some(request)),
                Line::Blank => continue,
                Line::Pending => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let next = self.lines.decode_eof(src);
            match self.on_line(next)? {
                Line::Ready(request) => return Ok(Some(request)),
                Line::Blank => continue,
                Line::Pending => return Ok(None),
            }
        }
    }
}
