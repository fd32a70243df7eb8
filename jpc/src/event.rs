use log::{error, info, warn};

/// Receives informational, warning and error messages from a decoding
/// session.
///
/// Every method defaults to doing nothing.
pub trait EventHandler: Send {
    fn on_info(&self, _message: &str) {}
    fn on_warning(&self, _message: &str) {}
    fn on_error(&self, _message: &str) {}
}

/// Drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl EventHandler for NoopEvents {}

/// Forwards messages to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl EventHandler for LogEvents {
    fn on_info(&self, message: &str) {
        info!("{}", message);
    }

    fn on_warning(&self, message: &str) {
        warn!("{}", message);
    }

    fn on_error(&self, message: &str) {
        error!("{}", message);
    }
}
