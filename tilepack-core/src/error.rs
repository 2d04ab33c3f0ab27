use std::fmt;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal errors. Any of these aborts the package being resolved and rolls
/// back every handle minted for it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate path in file set: {0}")]
    DuplicatePath(String),

    #[error("invalid upload path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("no manifest found in package {0:?}")]
    NoManifestFound(String),

    #[error("malformed manifest {path}: {source}")]
    MalformedManifest {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cyclic manifest reference: {}", .chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    #[error("failed to serialize manifest {path}: {source}")]
    SerializeManifest {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Problems that only affect a single reference. The node gets the absent
/// marker and resolution carries on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WarningKind {
    MissingReference,
    MalformedManifest(String),
    UnresolvableReference(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    /// Canonical path (or the raw reference, if it never canonicalized).
    pub target: String,
    /// Manifest the reference was found in.
    pub referrer: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WarningKind::MissingReference => {
                write!(f, "{}: referenced file not found: {}", self.referrer, self.target)
            }
            WarningKind::MalformedManifest(msg) => {
                write!(f, "{}: child manifest {} skipped: {}", self.referrer, self.target, msg)
            }
            WarningKind::UnresolvableReference(msg) => {
                write!(f, "{}: cannot resolve {:?}: {}", self.referrer, self.target, msg)
            }
        }
    }
}
