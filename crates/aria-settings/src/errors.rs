//! Settings errors.

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors raised while loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// File read/write failure.
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse or shape failure.
    #[error("settings parse error: {0}")]
    Parse(String),

    /// Serialization of the defaults failed (programming error surface).
    #[error("settings serialize error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let e = SettingsError::Parse("line 3: trailing comma".into());
        assert!(e.to_string().contains("line 3"));
    }
}
