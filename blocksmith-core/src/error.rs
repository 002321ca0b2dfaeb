//! Error types for the blocksmith core library.
//!
//! Defines one error enum per pipeline concern and a convenient result alias
//! for the script runtime, which aggregates them.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Errors raised while ingesting tabular node/edge files.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum IngestError {
    /// A node or edge file could not be opened or read.
    #[error("failed to read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A file had no header row to derive the column layout from.
    #[error("`{}` has no header row", .path.display())]
    MissingHeader { path: PathBuf },
    /// A configured column index does not exist in the header.
    #[error(
        "`{}` does not define enough columns to read the {what} at index {index}; \
         the header has {columns} column(s)",
        .path.display()
    )]
    ColumnOutOfRange {
        what: &'static str,
        index: usize,
        columns: usize,
        path: PathBuf,
    },
}

/// Errors raised while reading or writing model files.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CodecError {
    /// The model file could not be opened, read, or written.
    #[error("failed to access `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A `#` directive other than META/NODES/EDGES was encountered.
    #[error("unexpected directive `{line}` in `{}`; the file may be malformed", .path.display())]
    UnknownDirective { line: String, path: PathBuf },
    /// A data line appeared before any section directive.
    #[error("unexpected line `{line}` before the first directive in `{}`", .path.display())]
    OrphanLine { line: String, path: PathBuf },
    /// No META section with a NAME entry was found.
    #[error("`{}` is missing a META section with at least a NAME entry", .path.display())]
    MissingMeta { path: PathBuf },
    /// No NODES row survived parsing.
    #[error("`{}` is missing a NODES section with at least one node interval", .path.display())]
    MissingNodes { path: PathBuf },
    /// No EDGES row survived parsing.
    #[error("`{}` is missing an EDGES section with at least one block", .path.display())]
    MissingEdges { path: PathBuf },
    /// A meta key, meta value, or type label contains a character the
    /// line-oriented format cannot represent.
    #[error("{what} `{value}` contains a character forbidden by the model format")]
    ForbiddenCharacter { what: &'static str, value: String },
    /// The directory that should hold the output file does not exist.
    #[error("directory does not exist: `{}`", .path.display())]
    MissingParentDir { path: PathBuf },
}

/// Errors raised while tokenizing or parsing instruction scripts.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq)]
pub enum ScriptError {
    /// A double quote was opened but never closed.
    #[error("encountered an unmatched quotation mark; check your input")]
    UnmatchedQuote,
    /// A `-` token did not name a known instruction.
    #[error("unknown instruction tag `{tag}`")]
    UnknownTag { tag: String },
    /// A `+` token did not name a known sub-instruction.
    #[error("unknown sub-instruction `{subtag}`")]
    UnknownSubtag { subtag: String },
    /// A tag, subtag, or argument appeared where another kind was expected.
    #[error("expected {expected}, found `{found}`")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    /// An instruction received the wrong number of arguments.
    #[error("{instruction} expects {want} argument(s), got {have}")]
    WrongArity {
        instruction: &'static str,
        want: usize,
        have: usize,
    },
    /// Template/replacement arguments were not supplied in pairs.
    #[error("-Execute expects one script path plus pairs of template/replacement arguments")]
    UnbalancedTemplates,
    /// An argument could not be converted to the required number type.
    #[error("could not convert `{value}` of {instruction} to a {kind}")]
    InvalidNumber {
        instruction: &'static str,
        value: String,
        kind: &'static str,
    },
    /// Scale factors must be strictly positive.
    #[error("scaling factor {got} must be greater than 0")]
    NonPositiveScale { got: f64 },
}

/// Errors raised while sampling a graph from a model.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SamplerError {
    /// An output file could not be created or written.
    #[error("failed to write `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Stable codes describing [`RuntimeError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum RuntimeErrorCode {
    /// An instruction required an active model but none was present.
    NoActiveModel,
    /// Script text failed to tokenize or parse.
    Script,
    /// Tabular ingestion failed.
    Ingest,
    /// Model (de)serialization failed.
    Codec,
    /// Graph sampling failed.
    Sampler,
    /// A script file could not be loaded.
    ScriptFile,
}

impl RuntimeErrorCode {
    /// Return the stable machine-readable representation of this error code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoActiveModel => "RUNTIME_NO_ACTIVE_MODEL",
            Self::Script => "RUNTIME_SCRIPT_PARSE",
            Self::Ingest => "RUNTIME_INGEST",
            Self::Codec => "RUNTIME_CODEC",
            Self::Sampler => "RUNTIME_SAMPLER",
            Self::ScriptFile => "RUNTIME_SCRIPT_FILE",
        }
    }
}

impl fmt::Display for RuntimeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type produced while executing instructions.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The instruction requires `-Read` or `-Load` to have run first.
    #[error(
        "a model needs to be active before {instruction} can run; use -Read or -Load first"
    )]
    NoActiveModel { instruction: &'static str },
    /// Script text failed to tokenize or parse.
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// Tabular ingestion failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Model (de)serialization failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Graph sampling failed.
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    /// An included script file could not be loaded.
    #[error("could not open script `{}` for reading: {source}", .path.display())]
    ScriptFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RuntimeError {
    /// Retrieve the stable [`RuntimeErrorCode`] for this error.
    #[must_use]
    pub const fn code(&self) -> RuntimeErrorCode {
        match self {
            Self::NoActiveModel { .. } => RuntimeErrorCode::NoActiveModel,
            Self::Script(_) => RuntimeErrorCode::Script,
            Self::Ingest(_) => RuntimeErrorCode::Ingest,
            Self::Codec(_) => RuntimeErrorCode::Codec,
            Self::Sampler(_) => RuntimeErrorCode::Sampler,
            Self::ScriptFile { .. } => RuntimeErrorCode::ScriptFile,
        }
    }
}

/// Convenient alias for results returned by the script runtime.
pub type Result<T> = core::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_codes_are_stable() {
        let err = RuntimeError::NoActiveModel {
            instruction: "-Generate",
        };
        assert_eq!(err.code().as_str(), "RUNTIME_NO_ACTIVE_MODEL");
        let err: RuntimeError = ScriptError::UnmatchedQuote.into();
        assert_eq!(err.code(), RuntimeErrorCode::Script);
    }

    #[test]
    fn column_errors_name_the_offending_index() {
        let err = IngestError::ColumnOutOfRange {
            what: "node id",
            index: 7,
            columns: 2,
            path: PathBuf::from("nodes.tsv"),
        };
        let message = err.to_string();
        assert!(message.contains("node id"));
        assert!(message.contains('7'));
        assert!(message.contains("nodes.tsv"));
    }
}
