//! Splits an unbounded INDI byte stream into complete top-level elements.
//!
//! INDI has no framing: the server writes one XML element after the other, separated by
//! arbitrary (or no) whitespace. The [`ElementTokenizer`] keeps the bytes it has been fed,
//! tracks the nesting depth of tags and hands out the text of an element as soon as its
//! top-level closing tag arrived.
//!
//! ```
//! use indi_protocol::tokenizer::ElementTokenizer;
//!
//! let mut tokenizer = ElementTokenizer::default();
//! tokenizer.push(b"  <delProperty device=\"CCD\" ");
//! assert!(tokenizer.next_element().is_none());
//! tokenizer.push(b"name=\"TEMP\"/>\n<message");
//! let element = tokenizer.next_element().unwrap().unwrap();
//! assert_eq!(element, "<delProperty device=\"CCD\" name=\"TEMP\"/>");
//! assert!(tokenizer.next_element().is_none());
//! ```
use crate::error::ParseError;

/// Default bound for a single buffered element.
pub const DEFAULT_MAX_ELEMENT_SIZE: usize = 16 * 1024 * 1024;

/// Trimmed elements of this length or shorter are treated as noise.
const MIN_ELEMENT_LEN: usize = 3;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Scan {
    /// Between top-level elements, or inside element content.
    Content,
    /// Inside `<name ...>` or `</name>`; `quote` is the open attribute quote, if any.
    Tag {
        closing: bool,
        quote: Option<u8>,
        last: u8,
    },
    Comment,
    CData,
    /// `<?...?>` or `<!DOCTYPE ...>`
    Instruction,
}

#[derive(Debug)]
pub struct ElementTokenizer {
    buffer: Vec<u8>,
    /// Bytes before this index have already been scanned.
    position: usize,
    /// Start of the current top-level element within `buffer`.
    start: Option<usize>,
    depth: usize,
    scan: Scan,
    max_element_size: usize,
}

impl Default for ElementTokenizer {
    fn default() -> Self {
        ElementTokenizer::new(DEFAULT_MAX_ELEMENT_SIZE)
    }
}

impl ElementTokenizer {
    pub fn new(max_element_size: usize) -> ElementTokenizer {
        ElementTokenizer {
            buffer: Vec::with_capacity(4096),
            position: 0,
            start: None,
            depth: 0,
            scan: Scan::Content,
            max_element_size,
        }
    }

    /// Appends bytes received from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes currently held back.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops everything buffered and starts over at depth zero.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.position = 0;
        self.start = None;
        self.depth = 0;
        self.scan = Scan::Content;
    }

    /// Returns the next complete top-level element, if one is available.
    ///
    /// An error consumes the offending bytes, so calling this again continues
    /// with whatever follows them.
    pub fn next_element(&mut self) -> Option<Result<String, ParseError>> {
        loop {
            let end = match self.scan_to_boundary() {
                Ok(Some(end)) => end,
                Ok(None) => return self.check_size(),
                Err(err) => return Some(Err(err)),
            };
            let start = self.start.take().unwrap_or(0);
            let bytes: Vec<u8> = self.buffer.drain(..end).skip(start).collect();
            self.position = 0;
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(err) => return Some(Err(err.into())),
            };
            let trimmed = text.trim();
            if trimmed.len() > MIN_ELEMENT_LEN {
                return Some(Ok(trimmed.to_string()));
            }
        }
    }

    fn check_size(&mut self) -> Option<Result<String, ParseError>> {
        if self.start.is_none() && self.scan == Scan::Content {
            // nothing but inter-element noise has been scanned
            self.buffer.drain(..self.position);
            self.position = 0;
        }
        let held = self.buffer.len() - self.start.unwrap_or(0);
        if held > self.max_element_size {
            self.reset();
            return Some(Err(ParseError::ElementTooLarge {
                max: self.max_element_size,
                got: held,
            }));
        }
        None
    }

    /// Advances the scanner. Returns the end index of a completed top-level element.
    fn scan_to_boundary(&mut self) -> Result<Option<usize>, ParseError> {
        while self.position < self.buffer.len() {
            let byte = self.buffer[self.position];
            match self.scan {
                Scan::Content => {
                    if byte != b'<' {
                        self.position += 1;
                        continue;
                    }
                    let Some(&next) = self.buffer.get(self.position + 1) else {
                        return Ok(None);
                    };
                    match next {
                        b'/' => {
                            self.enter_markup();
                            self.scan = Scan::Tag {
                                closing: true,
                                quote: None,
                                last: next,
                            };
                            self.position += 2;
                        }
                        b'?' => {
                            self.enter_markup();
                            self.scan = Scan::Instruction;
                            self.position += 2;
                        }
                        b'!' => {
                            let rest = &self.buffer[self.position..];
                            if rest.starts_with(b"<!--") {
                                self.enter_markup();
                                self.scan = Scan::Comment;
                                self.position += 4;
                            } else if rest.starts_with(b"<![CDATA[") {
                                self.enter_markup();
                                self.scan = Scan::CData;
                                self.position += 9;
                            } else if rest.len() < 9
                                && (b"<!--".starts_with(rest) || b"<![CDATA[".starts_with(rest))
                            {
                                return Ok(None);
                            } else {
                                self.enter_markup();
                                self.scan = Scan::Instruction;
                                self.position += 2;
                            }
                        }
                        _ => {
                            if self.depth == 0 {
                                self.start = Some(self.position);
                            }
                            self.scan = Scan::Tag {
                                closing: false,
                                quote: None,
                                last: b'<',
                            };
                            self.position += 1;
                        }
                    }
                }
                Scan::Tag {
                    closing,
                    quote,
                    last,
                } => {
                    self.position += 1;
                    match quote {
                        Some(open) => {
                            let quote = if byte == open { None } else { quote };
                            self.scan = Scan::Tag {
                                closing,
                                quote,
                                last: byte,
                            };
                        }
                        None if byte == b'"' || byte == b'\'' => {
                            self.scan = Scan::Tag {
                                closing,
                                quote: Some(byte),
                                last: byte,
                            };
                        }
                        None if byte == b'>' => {
                            self.scan = Scan::Content;
                            if closing {
                                if self.depth == 0 {
                                    return Err(self.unbalanced_close());
                                }
                                self.depth -= 1;
                            } else if last != b'/' {
                                self.depth += 1;
                            }
                            if self.depth == 0 && self.start.is_some() {
                                return Ok(Some(self.position));
                            }
                        }
                        None => {
                            self.scan = Scan::Tag {
                                closing,
                                quote,
                                last: byte,
                            };
                        }
                    }
                }
                Scan::Comment | Scan::CData | Scan::Instruction => {
                    let terminator: &[u8] = match self.scan {
                        Scan::Comment => b"-->",
                        Scan::CData => b"]]>",
                        _ => b">",
                    };
                    if !self.skip_until(terminator) {
                        return Ok(None);
                    }
                }
            }
        }
        Ok(None)
    }

    fn enter_markup(&mut self) {
        // markup outside of any element is not part of an element
        if self.depth == 0 && self.start.is_none() {
            self.buffer.drain(..self.position);
            self.position = 0;
        }
    }

    /// Skips past `terminator`. Returns `false` when more bytes are needed.
    fn skip_until(&mut self, terminator: &[u8]) -> bool {
        let window = &self.buffer[self.position..];
        match window
            .windows(terminator.len())
            .position(|candidate| candidate == terminator)
        {
            Some(index) => {
                self.position += index + terminator.len();
                self.scan = Scan::Content;
                if self.depth == 0 && self.start.is_none() {
                    self.buffer.drain(..self.position);
                    self.position = 0;
                }
                true
            }
            // keep a possible partial terminator for the next push
            None => {
                self.position += window.len().saturating_sub(terminator.len() - 1);
                false
            }
        }
    }

    fn unbalanced_close(&mut self) -> ParseError {
        let tag = String::from_utf8_lossy(&self.buffer[..self.position])
            .trim()
            .to_string();
        self.buffer.drain(..self.position);
        self.position = 0;
        self.start = None;
        ParseError::UnbalancedClose(tag)
    }
}
