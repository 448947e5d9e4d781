use crate::error::BareMetalError;

/// Per-reconcile outcome of the bare-metal machine.
pub type ActionResult = hetzmetal_commons::utils::actionresult::ActionResult<BareMetalError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hetzmetal_commons::models::host::ErrorType;

    use super::*;

    #[test]
    fn test_error_result_is_harness_retried() {
        let result = ActionResult::Error(BareMetalError::Other("boom".into()));
        assert_eq!(result.requeue(), None);
    }

    #[test]
    fn test_failed_result_backs_off() {
        let result = ActionResult::Failed {
            error_type: ErrorType::ProvisioningError,
            error_count: 2,
        };
        let delay = result.requeue().unwrap();
        let base = Duration::from_secs(4 * 60);
        assert!(delay >= base / 2 && delay <= base);
    }
}
