//! Error types for the vellum PDF object library.
//!
//! Two disjoint families: logic errors (programmer bugs, always propagated)
//! and damage reports (input-caused, usually accumulated as warnings on the
//! owning document).

use thiserror::Error;

/// Classification of a damage report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageCode {
    /// Structurally damaged PDF data.
    DamagedPdf,
    /// Password / decryption-key problem.
    Password,
    /// Valid but unsupported construct.
    Unsupported,
}

impl DamageCode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::DamagedPdf => "damaged PDF",
            Self::Password => "invalid password",
            Self::Unsupported => "unsupported",
        }
    }
}

/// A structured damage report: what went wrong, where, and in which object.
///
/// Damage values are collected as warnings via [`Document::warn`] unless the
/// condition is fatal (missing /Root, missing page tree, warning-limit
/// overflow).
///
/// [`Document::warn`]: crate::Document::warn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Damage {
    pub code: DamageCode,
    /// Name of the input source the damage was observed in.
    pub filename: String,
    /// Free-text description of the object being processed, may be empty.
    pub object: String,
    /// Byte offset the damage was observed at.
    pub offset: u64,
    pub message: String,
}

impl Damage {
    pub fn new(
        code: DamageCode,
        filename: impl Into<String>,
        object: impl Into<String>,
        offset: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            filename: filename.into(),
            object: object.into(),
            offset,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Damage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.filename.is_empty() {
            write!(f, "{}", self.filename)?;
            if !self.object.is_empty() || self.offset > 0 {
                write!(f, " (")?;
                if !self.object.is_empty() {
                    write!(f, "{}, ", self.object)?;
                }
                write!(f, "offset {})", self.offset)?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

/// Primary error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Programmer error: wrong call sequence, wrong object type, use of a
    /// closed or unopened input source. Never caught by the library.
    #[error("logic error: {0}")]
    Logic(String),

    /// Input-caused damage escalated to an error.
    #[error("{0}")]
    Damaged(Damage),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Type-assertion failure for an accessor used on the wrong variant.
    pub(crate) fn type_assertion(expected: &str, got: &str) -> Self {
        Self::Logic(format!(
            "operation for {expected} attempted on object of type {got}"
        ))
    }

    pub(crate) fn logic(msg: impl Into<String>) -> Self {
        Self::Logic(msg.into())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
