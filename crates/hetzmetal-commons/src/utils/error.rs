use chrono::Utc;
use tracing::debug;

use crate::models::host::{
    ErrorType,
    HostStatus,
};

/// Records a counted failure on the host status.
///
/// A repeat of the current `(error_type, error_message)` pair increments the
/// error count and leaves `last_updated` untouched, so ladder timeouts keep
/// counting from the original occurrence. Any other error starts a new streak
/// at count 1.
pub fn set_error(status: &mut HostStatus, error_type: ErrorType, message: impl Into<String>) {
    let message = message.into();
    if status.error_type == Some(error_type) && status.error_message == message {
        status.error_count += 1;
        debug!(
            error_type = %error_type,
            error_count = status.error_count,
            "repeated host error"
        );
        return;
    }

    status.error_type = Some(error_type);
    status.error_message = message;
    status.error_count = 1;
    status.last_updated = Some(Utc::now());
}

pub fn clear_error(status: &mut HostStatus) {
    if status.error_type.is_none() && status.error_count == 0 {
        return;
    }
    status.error_type = None;
    status.error_message.clear();
    status.error_count = 0;
    status.last_updated = Some(Utc::now());
}
