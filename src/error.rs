pub type MabatakiResult<T> = Result<T, MabatakiError>;

#[derive(thiserror::Error, Debug)]
pub enum MabatakiError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("capacity error: {0}")]
    Capacity(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("bridge error: {0}")]
    Bridge(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MabatakiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn bridge(msg: impl Into<String>) -> Self {
        Self::Bridge(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            MabatakiError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            MabatakiError::capacity("x")
                .to_string()
                .contains("capacity error:")
        );
        assert!(
            MabatakiError::encode("x")
                .to_string()
                .contains("encode error:")
        );
        assert!(
            MabatakiError::bridge("x")
                .to_string()
                .contains("bridge error:")
        );
        assert!(MabatakiError::timeout("x").to_string().contains("timeout:"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = MabatakiError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
