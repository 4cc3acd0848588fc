/*
 * archway - Arch Linux package search and source fetch helper.
 * Copyright (C) 2025  archway contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Error types shared by the extractor, the fetch pipeline and the
//! repository clients.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Main error type for archway operations
#[derive(Debug, Error)]
pub enum ArchwayError {
    /// Open/create/read/write failures
    #[error("I/O error for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Malformed gzip or tar stream
    #[error("Malformed archive '{path}': {reason}")]
    Decode { path: String, reason: String },

    /// A path that does not follow the expected naming convention
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Query matched nothing
    #[error("Package '{query}' not found")]
    NotFound { query: String },

    /// Query matched more than one package
    #[error("Query '{query}' matches multiple packages ({})", .matches.join(", "))]
    AmbiguousQuery { query: String, matches: Vec<String> },

    /// Fetch destination already present
    #[error("{path} already exists")]
    AlreadyExists { path: String },

    /// A plain file sits where a download was about to be written
    #[error("Cannot download to '{path}': file exists")]
    DestinationConflict { path: String },

    /// Payload relocation failures
    #[error("Failed to copy '{from}' to '{to}': {reason}")]
    Copy {
        from: String,
        to: String,
        reason: String,
    },

    /// Transport-level failures
    #[error("Network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
        #[source]
        source: Option<Box<ureq::Error>>,
    },

    /// Non-success HTTP status
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Unparsable response body
    #[error("Malformed response from {context}: {source}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ArchwayError {
    /// Create an I/O error
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        ArchwayError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Classify an error raised while reading an archive stream; corrupt
    /// data becomes [`ArchwayError::Decode`]
    pub fn from_stream(path: impl AsRef<Path>, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
                Self::decode(path, source.to_string())
            }
            _ => Self::io(path, source),
        }
    }

    /// Create a decode error
    pub fn decode(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        ArchwayError::Decode {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ArchwayError::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a copy error
    pub fn copy(from: impl AsRef<Path>, to: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        ArchwayError::Copy {
            from: from.as_ref().display().to_string(),
            to: to.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }

    /// Create a network error
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        ArchwayError::Network {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a parse error
    pub fn parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        ArchwayError::Parse {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ArchwayError::NotFound { .. } | ArchwayError::HttpStatus { status: 404, .. }
        )
    }
}

/// Result type alias for archway operations
pub type ArchwayResult<T> = std::result::Result<T, ArchwayError>;

/// Extension trait for attaching a path to `std::io` results
pub trait IoResultExt<T> {
    fn at_path(self, path: impl AsRef<Path>) -> ArchwayResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at_path(self, path: impl AsRef<Path>) -> ArchwayResult<T> {
        self.map_err(|e| ArchwayError::io(path, e))
    }
}
