use std::io;

use indi_protocol::{
    PropertyKind,
    error::{DecodeError, ParseError},
};
use thiserror::Error;

/// Problems with the connection itself.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("No INDI server was defined, no connection could be made")]
    NoServer,
    #[error("The server cannot be changed while a connection to {host}:{port} exists")]
    AlreadyConnected { host: String, port: u16 },
    #[error("Could not resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: io::Error,
    },
    #[error("No connection to the INDI server at {host}:{port} could be established: {source}")]
    Connect {
        host: String,
        port: u16,
        source: io::Error,
    },
    #[error("Sending to the INDI server failed: {0}")]
    Write(#[source] io::Error),
    #[error("Reading from the INDI server failed: {0}")]
    Read(#[source] io::Error),
    #[error("The INDI server closed the connection")]
    Closed,
    #[error("Not connected to an INDI server")]
    NotConnected,
}

/// A property write that was refused before anything was sent.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown property vector {device}/{vector}")]
    UnknownVector { device: String, vector: String },
    #[error("Unknown member {member} of {device}/{vector}")]
    UnknownMember {
        device: String,
        vector: String,
        member: String,
    },
    #[error("{device}/{vector} is not writable")]
    ReadOnly { device: String, vector: String },
    #[error("{device}/{vector} is a {actual} vector, not a {requested} vector")]
    KindMismatch {
        device: String,
        vector: String,
        actual: PropertyKind,
        requested: PropertyKind,
    },
    #[error("Command could not be encoded: {0}")]
    Encode(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Command(#[from] CommandError),
}
