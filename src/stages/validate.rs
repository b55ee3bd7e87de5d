//! Static validation of the pattern before anything reaches the cluster.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::PatternValidator;
use crate::error::{ProvisionError, StageError};

use super::{Stage, StageData, StageOutcome};

/// Stage rejecting patterns that fail [`PatternValidator`].
#[derive(Debug, Default)]
pub struct ValidateStage {
    validator: PatternValidator,
}

impl ValidateStage {
    /// Creates a validation stage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            validator: PatternValidator::new(),
        }
    }
}

#[async_trait]
impl Stage for ValidateStage {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn run(&self, data: &mut StageData, error: Option<ProvisionError>) -> StageOutcome {
        if let Some(err) = error {
            return StageOutcome::Terminate(err);
        }

        let result = self.validator.check(&data.pattern);
        for warning in &result.warnings {
            warn!("{warning}");
        }

        if result.is_valid() {
            info!(
                "Pattern '{}' is valid ({} warnings)",
                data.pattern.name,
                result.warning_count()
            );
            StageOutcome::Continue(None)
        } else {
            StageOutcome::Terminate(
                StageError::InvalidPattern {
                    message: result.summary(),
                }
                .into(),
            )
        }
    }
}
