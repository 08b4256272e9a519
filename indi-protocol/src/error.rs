use std::{io, string::FromUtf8Error};

use thiserror::Error;

/// Errors raised while cutting the byte stream into elements or building their tree.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Invalid UTF8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
    #[error("Malformed XML: {0}")]
    Xml(String),
    #[error("Element too large! Maximum is {max}, but got {got}")]
    ElementTooLarge { max: usize, got: usize },
    #[error("Closing tag {0} without matching opening tag")]
    UnbalancedClose(String),
    #[error("Element {0} is not closed")]
    Unclosed(String),
    #[error("Document contains no element")]
    Empty,
    #[error("Document contains more than one root element")]
    MultipleRoots,
}

impl From<quick_xml::Error> for ParseError {
    fn from(value: quick_xml::Error) -> Self {
        ParseError::Xml(value.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(value: quick_xml::events::attributes::AttrError) -> Self {
        ParseError::Xml(value.to_string())
    }
}

/// Well-formed XML that does not make sense as an INDI message.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("<{element}> is missing the required attribute '{attribute}'")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    #[error("Invalid number '{value}' for {device}/{vector}/{property}")]
    InvalidNumber {
        device: String,
        vector: String,
        property: String,
        value: String,
    },
    #[error("Number {device}/{vector}/{property} skipped: missing or invalid '{attribute}'")]
    InvalidLimit {
        device: String,
        vector: String,
        property: String,
        attribute: &'static str,
    },
    #[error("Invalid timestamp '{value}' on {device}/{vector}")]
    InvalidTimestamp {
        device: String,
        vector: String,
        value: String,
    },
    #[error("Unknown device {0}")]
    UnknownDevice(String),
    #[error("Unknown property vector {device}/{vector}")]
    UnknownVector { device: String, vector: String },
    #[error("Unknown property {device}/{vector}/{property}")]
    UnknownProperty {
        device: String,
        vector: String,
        property: String,
    },
    #[error("<{element}> does not match the kind of {device}/{vector}")]
    KindMismatch {
        element: String,
        device: String,
        vector: String,
    },
}
