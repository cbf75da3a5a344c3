use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    /// The queue could not be resolved; no worker was started.
    SetupError(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::SetupError(_) | Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::SetupError(e) | Self::RuntimeError(e) => e,
        }
    }
}

impl From<qdrill_core::Error> for RunError {
    fn from(err: qdrill_core::Error) -> Self {
        if err.is_invalid_config() {
            Self::InvalidInput(anyhow::Error::new(err).context("invalid drill config"))
        } else if matches!(err, qdrill_core::Error::Setup { .. }) {
            Self::SetupError(anyhow::Error::new(err))
        } else {
            Self::RuntimeError(anyhow::Error::new(err).context("drill failed"))
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrill_core::QueueError;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let invalid = RunError::from(qdrill_core::Error::InvalidTotal);
        assert_eq!(invalid.exit_code(), ExitCode::InvalidInput);

        let setup = RunError::from(qdrill_core::Error::Setup {
            queue: "q".to_string(),
            source: QueueError::NotFound("q".to_string()),
        });
        assert!(matches!(setup, RunError::SetupError(_)));
        assert_eq!(setup.exit_code(), ExitCode::RuntimeError);
        assert!(setup.to_string().contains("failed to resolve queue `q`"));

        let gone = RunError::from(qdrill_core::Error::AggregatorGone);
        assert_eq!(gone.exit_code(), ExitCode::RuntimeError);
    }
}
