//! Progress reporting and cancellation.
//!
//! The host drives a UI (or a log) through [`ProcessCallback`]; the engine
//! calls it for status lines, phase changes, stat deltas, warnings, and
//! error decisions. `request_ui_update` doubles as the cancellation point:
//! returning `Err(Cancelled)` aborts the current operation after the item
//! in flight has been committed or rolled back.

use tandem_vfs::{Cancelled, FileError, OpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessPhase {
    None,
    Scanning,
    ComparingContent,
    Synchronizing,
}

/// What to do about a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorChoice {
    Retry,
    Ignore,
    Abort,
}

pub trait ProcessCallback {
    fn init_new_phase(&mut self, item_total: usize, byte_total: u64, phase: ProcessPhase);
    /// Accumulated progress within the current phase.
    fn update_data_processed(&mut self, items_delta: usize, bytes_delta: u64);
    fn update_status(&mut self, msg: &str);
    fn log_info(&mut self, msg: &str);
    /// Cancellation point; `force` bypasses the host's update throttling.
    fn request_ui_update(&mut self, force: bool) -> Result<(), Cancelled>;
    /// `warn_flag` is the persistent "don't show again" switch; hosts reset
    /// it when the user opts out of the warning class.
    fn report_warning(&mut self, msg: &str, warn_flag: &mut bool);
    fn report_error(&mut self, msg: &str, retry_number: usize) -> ErrorChoice;
}

/// Headless callback: routes everything to the log, never cancels,
/// ignores errors after logging them.
#[derive(Default)]
pub struct SilentCallback;

impl ProcessCallback for SilentCallback {
    fn init_new_phase(&mut self, _item_total: usize, _byte_total: u64, _phase: ProcessPhase) {}

    fn update_data_processed(&mut self, _items_delta: usize, _bytes_delta: u64) {}

    fn update_status(&mut self, _msg: &str) {}

    fn log_info(&mut self, msg: &str) {
        log::info!("{msg}");
    }

    fn request_ui_update(&mut self, _force: bool) -> Result<(), Cancelled> {
        Ok(())
    }

    fn report_warning(&mut self, msg: &str, _warn_flag: &mut bool) {
        log::warn!("{msg}");
    }

    fn report_error(&mut self, msg: &str, _retry_number: usize) -> ErrorChoice {
        log::error!("{msg}");
        ErrorChoice::Ignore
    }
}

/// Run `op`, routing failures to the callback until it answers ignore or
/// abort. Returns the ignored error, if any.
pub fn try_reporting_error(
    callback: &mut dyn ProcessCallback,
    op: &mut dyn FnMut(&mut dyn ProcessCallback) -> Result<(), OpError>,
) -> Result<Option<FileError>, Cancelled> {
    let mut retry_number = 0;
    loop {
        match op(callback) {
            Ok(()) => return Ok(None),
            Err(OpError::Cancelled) => return Err(Cancelled),
            Err(OpError::File(err)) => {
                match callback.report_error(&err.to_string(), retry_number) {
                    ErrorChoice::Retry => retry_number += 1,
                    ErrorChoice::Ignore => return Ok(Some(err)),
                    ErrorChoice::Abort => return Err(Cancelled),
                }
            }
        }
    }
}

/// Status line + log entry in one step; every bulk mutation reports this way.
pub fn log_and_status(callback: &mut dyn ProcessCallback, msg: &str) {
    callback.log_info(msg);
    callback.update_status(msg);
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingCallback;
    use super::*;

    #[test]
    fn try_reporting_error_retries_then_ignores() {
        let mut cb = RecordingCallback::default();
        let mut attempts = 0;
        let result = try_reporting_error(&mut cb, &mut |_cb| {
            attempts += 1;
            Err(FileError::new("boom", "").into())
        })
        .unwrap();
        assert!(result.is_some());
        assert_eq!(attempts, 1); // default choice ignores immediately
        assert_eq!(cb.errors.len(), 1);
    }

    #[test]
    fn try_reporting_error_abort_cancels() {
        let mut cb = RecordingCallback {
            error_choice: Some(ErrorChoice::Abort),
            ..Default::default()
        };
        let result = try_reporting_error(&mut cb, &mut |_cb| {
            Err(FileError::new("boom", "").into())
        });
        assert!(result.is_err());
    }

    #[test]
    fn silent_callback_never_cancels_and_ignores_errors() {
        let mut cb = SilentCallback;
        assert!(cb.request_ui_update(true).is_ok());
        let ignored = try_reporting_error(&mut cb, &mut |_cb| {
            Err(FileError::new("boom", "").into())
        })
        .unwrap();
        assert!(ignored.is_some());
    }
}
