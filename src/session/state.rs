//! Build request, result and session state

use crate::cache::entry::segment_problem;
use crate::error::{ForgeError, ForgeResult};
use crate::resolver::ModuleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One firmware build request. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    board: String,
    modules: Vec<ModuleId>,
    main_source: String,
    caching: bool,
}

impl BuildRequest {
    /// Validate and accept a request
    pub fn new(
        board: impl Into<String>,
        modules: Vec<ModuleId>,
        main_source: impl Into<String>,
        caching: bool,
    ) -> ForgeResult<Self> {
        let board = board.into();
        if board.trim().is_empty() {
            return Err(ForgeError::InvalidRequest("board must not be empty".to_string()));
        }
        // The board names a directory under bin/ and a Makefile line
        if let Some(reason) = segment_problem(&board) {
            return Err(ForgeError::InvalidRequest(format!(
                "invalid board {:?}: {}",
                board, reason
            )));
        }
        if modules.is_empty() {
            return Err(ForgeError::InvalidRequest(
                "at least one module is required".to_string(),
            ));
        }

        Ok(Self {
            board,
            modules,
            main_source: main_source.into(),
            caching,
        })
    }

    pub fn board(&self) -> &str {
        &self.board
    }

    /// Module ids in request order
    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }

    pub fn main_source(&self) -> &str {
        &self.main_source
    }

    pub fn caching(&self) -> bool {
        self.caching
    }
}

/// Outcome of one build request, accumulated over the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub cmd_output: String,
    pub board: String,
    pub application_name: String,
    #[serde(with = "base64_bytes")]
    pub output_archive: Option<Vec<u8>>,
    pub output_archive_extension: Option<String>,
    pub success: bool,
}

impl BuildResult {
    pub fn new(board: impl Into<String>) -> Self {
        Self {
            cmd_output: String::new(),
            board: board.into(),
            application_name: "application".to_string(),
            output_archive: None,
            output_archive_extension: None,
            success: false,
        }
    }

    /// Append text to the human-readable output
    pub fn append(&mut self, text: impl AsRef<str>) {
        self.cmd_output.push_str(text.as_ref());
    }

    /// Append a line, separating it from previous output
    pub fn annotate(&mut self, line: impl AsRef<str>) {
        if !self.cmd_output.is_empty() && !self.cmd_output.ends_with('\n') {
            self.cmd_output.push('\n');
        }
        self.cmd_output.push_str(line.as_ref());
        self.cmd_output.push('\n');
    }

    /// Record the packaged archive and mark the build successful
    pub fn succeed(&mut self, archive: Vec<u8>, extension: impl Into<String>) {
        self.output_archive = Some(archive);
        self.output_archive_extension = Some(extension.into());
        self.success = true;
    }
}

/// Archive bytes travel as base64 text in JSON
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Lifecycle of a build session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Prepared,
    CacheWarmed,
    Built,
    Published,
    Ended,
}

impl SessionState {
    /// Move to `next`, rejecting anything that is not strictly later
    pub fn advance(&mut self, next: SessionState) -> ForgeResult<()> {
        if next <= *self {
            return Err(ForgeError::SessionTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Prepared => "prepared",
            Self::CacheWarmed => "cache-warmed",
            Self::Built => "built",
            Self::Published => "published",
            Self::Ended => "ended",
        };
        write!(f, "{}", name)
    }
}
