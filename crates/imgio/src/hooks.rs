//! Process-wide codec diagnostic hooks.
//!
//! Codec code reports recoverable problems with [`warning`] and hard
//! failures with [`error`]. The handler pair is installed once per process,
//! either explicitly through [`install`] or lazily with the default
//! `tracing` handlers, and never replaced afterwards. Handlers are plain
//! function pointers and must not keep mutable state.
//!
//! # Fail-fast
//!
//! A loader with `fail` set wraps its decode in a [`DecodeScope`]. Warnings
//! raised on the same thread while the scope is alive are recorded, and
//! [`DecodeScope::check`] turns the first one into [`IoError::Warning`].
//! Warnings raised on other threads are not attributed to any scope, so
//! escalation is best-effort for codecs that report from worker threads.

use crate::{IoError, IoResult};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::OnceLock;
use tracing::{error as log_error, warn as log_warn};

/// Diagnostic handler: `(module, message)`.
pub type Handler = fn(&str, &str);

#[derive(Clone, Copy)]
struct Handlers {
    warning: Handler,
    error: Handler,
}

static HANDLERS: OnceLock<Handlers> = OnceLock::new();

thread_local! {
    static SCOPE: RefCell<Option<ScopeState>> = const { RefCell::new(None) };
}

fn default_warning(module: &str, message: &str) {
    log_warn!(codec = module, "{message}");
}

fn default_error(module: &str, message: &str) {
    log_error!(codec = module, "{message}");
}

fn handlers() -> &'static Handlers {
    HANDLERS.get_or_init(|| Handlers {
        warning: default_warning,
        error: default_error,
    })
}

/// Installs the default handlers if none are installed yet.
pub fn init() {
    handlers();
}

/// Installs a custom handler pair.
///
/// Returns `false` if handlers were already installed; the existing pair
/// stays in place.
pub fn install(warning: Handler, error: Handler) -> bool {
    HANDLERS.set(Handlers { warning, error }).is_ok()
}

/// Reports a recoverable codec problem.
pub fn warning(module: &str, message: &str) {
    (handlers().warning)(module, message);
    SCOPE.with(|scope| {
        if let Some(state) = scope.borrow_mut().as_mut() {
            state.record(module, message);
        }
    });
}

/// Reports a hard codec failure. The caller still returns its own error.
pub fn error(module: &str, message: &str) {
    (handlers().error)(module, message);
}

struct ScopeState {
    fail: bool,
    warnings: usize,
    first: Option<String>,
}

impl ScopeState {
    fn record(&mut self, module: &str, message: &str) {
        self.warnings += 1;
        if self.first.is_none() {
            self.first = Some(format!("{module}: {message}"));
        }
    }
}

/// Collects warnings raised on this thread while alive.
///
/// Scopes nest; dropping one restores the enclosing scope.
#[must_use]
pub struct DecodeScope {
    previous: Option<ScopeState>,
    _thread_bound: PhantomData<*const ()>,
}

impl DecodeScope {
    /// Starts collecting. `fail` decides whether [`check`](Self::check)
    /// escalates.
    pub fn enter(fail: bool) -> Self {
        let state = ScopeState {
            fail,
            warnings: 0,
            first: None,
        };
        let previous = SCOPE.with(|scope| scope.replace(Some(state)));
        Self {
            previous,
            _thread_bound: PhantomData,
        }
    }

    /// Number of warnings recorded so far.
    pub fn warnings(&self) -> usize {
        SCOPE.with(|scope| scope.borrow().as_ref().map_or(0, |s| s.warnings))
    }

    /// Fails with the first recorded warning when fail-fast is set.
    pub fn check(&self) -> IoResult<()> {
        SCOPE.with(|scope| match scope.borrow().as_ref() {
            Some(ScopeState {
                fail: true,
                first: Some(first),
                ..
            }) => Err(IoError::Warning(first.clone())),
            _ => Ok(()),
        })
    }
}

impl Drop for DecodeScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        SCOPE.with(|scope| *scope.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignore(_: &str, _: &str) {}

    #[test]
    fn handlers_install_once() {
        init();
        assert!(!install(ignore, ignore));
    }

    #[test]
    fn scope_escalates_only_when_failing() {
        let lenient = DecodeScope::enter(false);
        warning("test", "odd marker");
        assert_eq!(lenient.warnings(), 1);
        assert!(lenient.check().is_ok());
        drop(lenient);

        let strict = DecodeScope::enter(true);
        assert!(strict.check().is_ok());
        warning("test", "first");
        warning("test", "second");
        let err = strict.check().unwrap_err();
        assert!(matches!(err, IoError::Warning(ref m) if m == "test: first"));
    }

    #[test]
    fn nested_scopes_restore() {
        let outer = DecodeScope::enter(true);
        {
            let inner = DecodeScope::enter(false);
            warning("test", "inner only");
            assert_eq!(inner.warnings(), 1);
        }
        assert_eq!(outer.warnings(), 0);
        assert!(outer.check().is_ok());
    }

    #[test]
    fn warnings_on_other_threads_are_not_attributed() {
        let scope = DecodeScope::enter(true);
        std::thread::spawn(|| warning("test", "elsewhere"))
            .join()
            .unwrap();
        assert!(scope.check().is_ok());
    }
}
