//! Per-frame diagnostics for recoverable failures.
//!
//! Every stage-local problem that does not abort a pass (a dropped
//! detection, a detector timeout, a segmentation fallback) is recorded
//! here with the frame and stage it belongs to, and mirrored to the log.

use std::fmt;

/// Pipeline stage a diagnostic is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decode,
    Detect,
    Associate,
    Segment,
    Composite,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decode => "decode",
            Stage::Detect => "detect",
            Stage::Associate => "associate",
            Stage::Segment => "segment",
            Stage::Composite => "composite",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub frame_index: u64,
    pub stage: Stage,
    pub message: String,
}

impl Diagnostic {
    pub fn new(frame_index: u64, stage: Stage, message: impl Into<String>) -> Self {
        let diagnostic = Self {
            frame_index,
            stage,
            message: message.into(),
        };
        tracing::warn!(
            frame = diagnostic.frame_index,
            stage = %diagnostic.stage,
            "{}",
            diagnostic.message
        );
        diagnostic
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {} [{}]: {}", self.frame_index, self.stage, self.message)
    }
}

/// Ordered collection of diagnostics for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, frame_index: u64, stage: Stage, message: impl Into<String>) {
        self.0.push(Diagnostic::new(frame_index, stage, message));
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(move |d| d.stage == stage)
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
