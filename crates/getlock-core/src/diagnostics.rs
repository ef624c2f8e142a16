//! Structured events around each lock transition.
//!
//! Events carry the process id and the current thread so interleavings
//! across processes sharing one server can be reconstructed from logs. When
//! the caller supplies a span, events are recorded inside it.

use tracing::Span;

use crate::{normalize::LockKey, query::Scalar};

#[derive(Debug, Clone, Default)]
pub(crate) struct Diagnostics {
    span: Option<Span>,
}

macro_rules! emit {
    ($self:ident, $level:ident, $key:expr, $($arg:tt)+) => {{
        let _entered = $self.span.as_ref().map(Span::enter);
        tracing::$level!(
            pid = std::process::id(),
            thread = ?std::thread::current().id(),
            key = %$key,
            $($arg)+
        );
    }};
}

impl Diagnostics {
    pub(crate) const fn new(span: Option<Span>) -> Self {
        Self { span }
    }

    pub(crate) fn waiting(&self, key: &LockKey, timeout: i64) {
        emit!(self, info, key, timeout, "Wait acquiring a mysql lock");
    }

    pub(crate) fn acquired(&self, key: &LockKey) {
        emit!(self, info, key, "Acquired a mysql lock");
    }

    pub(crate) fn acquire_timed_out(&self, key: &LockKey) {
        emit!(self, info, key, "Timeout to acquire a mysql lock");
    }

    pub(crate) fn acquire_unknown(&self, key: &LockKey, reply: &Scalar) {
        emit!(self, warn, key, reply = %reply, "Unknown error to acquire a mysql lock");
    }

    pub(crate) fn released(&self, key: &LockKey) {
        emit!(self, info, key, "Released a mysql lock");
    }

    pub(crate) fn release_foreign(&self, key: &LockKey) {
        emit!(
            self,
            info,
            key,
            "Failed to release a mysql lock since somebody else locked it"
        );
    }

    pub(crate) fn release_missing(&self, key: &LockKey) {
        emit!(self, info, key, "Mysql lock did not exist");
    }

    pub(crate) fn deferred_release(&self, key: &LockKey) {
        emit!(
            self,
            warn,
            key,
            "Critical section cancelled, releasing mysql lock in background"
        );
    }

    pub(crate) fn release_failed(&self, key: &LockKey, error: &dyn std::error::Error) {
        emit!(self, warn, key, error = %error, "Failed to release a mysql lock");
    }
}
