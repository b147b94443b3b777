pub type SplashResult<T> = Result<T, SplashError>;

#[derive(thiserror::Error, Debug)]
pub enum SplashError {
    #[error("corrupt container: {0}")]
    CorruptContainer(String),

    #[error("missing asset: {0}")]
    MissingAsset(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("incomplete entry: {0}")]
    IncompleteEntry(String),

    #[error("generated output: {0}")]
    GeneratedOutput(String),

    #[error("no valid input: {0}")]
    NoValidInput(String),

    #[error("no valid entries: {0}")]
    NoValidEntries(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a [`SplashError`], used to group skipped inputs in reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    CorruptContainer,
    MissingAsset,
    InvalidGeometry,
    IncompleteEntry,
    GeneratedOutput,
    NoValidInput,
    NoValidEntries,
    Write,
    Validation,
    Other,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::CorruptContainer => "corrupt container",
            Self::MissingAsset => "missing asset",
            Self::InvalidGeometry => "invalid geometry",
            Self::IncompleteEntry => "incomplete entry",
            Self::GeneratedOutput => "generated output",
            Self::NoValidInput => "no valid input",
            Self::NoValidEntries => "no valid entries",
            Self::Write => "write error",
            Self::Validation => "validation error",
            Self::Other => "other",
        }
    }
}

impl SplashError {
    pub fn corrupt_container(msg: impl Into<String>) -> Self {
        Self::CorruptContainer(msg.into())
    }

    pub fn missing_asset(msg: impl Into<String>) -> Self {
        Self::MissingAsset(msg.into())
    }

    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    pub fn incomplete_entry(msg: impl Into<String>) -> Self {
        Self::IncompleteEntry(msg.into())
    }

    pub fn generated_output(msg: impl Into<String>) -> Self {
        Self::GeneratedOutput(msg.into())
    }

    pub fn no_valid_input(msg: impl Into<String>) -> Self {
        Self::NoValidInput(msg.into())
    }

    pub fn no_valid_entries(msg: impl Into<String>) -> Self {
        Self::NoValidEntries(msg.into())
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CorruptContainer(_) => ErrorKind::CorruptContainer,
            Self::MissingAsset(_) => ErrorKind::MissingAsset,
            Self::InvalidGeometry(_) => ErrorKind::InvalidGeometry,
            Self::IncompleteEntry(_) => ErrorKind::IncompleteEntry,
            Self::GeneratedOutput(_) => ErrorKind::GeneratedOutput,
            Self::NoValidInput(_) => ErrorKind::NoValidInput,
            Self::NoValidEntries(_) => ErrorKind::NoValidEntries,
            Self::Write(_) => ErrorKind::Write,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Batch-fatal errors: nothing usable remained after per-document filtering.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::NoValidInput(_) | Self::NoValidEntries(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
