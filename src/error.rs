use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a template (expected a `.{suffix}` suffix)", .path.display())]
    NotATemplate { path: PathBuf, suffix: String },

    #[error("`{0}` is not a valid macro name")]
    InvalidName(String),

    #[error("line {line}: malformed definition\n{detail}")]
    MalformedDefinition { line: usize, detail: String },

    #[error("line {line}: definition of `{name}` is never terminated")]
    UnterminatedDefinition { name: String, line: usize },

    #[error("macro expands to itself: {chain}")]
    RecursiveMacro { chain: String },

    #[error("{}: {source}", .path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// `true` if the template does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Read { source, .. } => source.kind() == io::ErrorKind::NotFound,
            Error::Template { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub(crate) fn in_template(self, path: impl Into<PathBuf>) -> Self {
        Error::Template {
            path: path.into(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
