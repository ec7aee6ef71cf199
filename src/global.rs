//! The process-wide listener slot.
//!
//! The checked pointer engine reports through a single listener that lives
//! for the whole run. This module holds it behind one lock so that
//! notifications coming from different threads are delivered one at a time.
//!
//! A listener must not call back into this module from inside a
//! notification; the lock is not reentrant.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    backtrace::Platform,
    listener::{Listener, ListenerFactory},
    options::Options,
};

type Slot = Option<Box<dyn Listener + Send>>;

static LISTENER: Mutex<Slot> = Mutex::new(None);

/// Returned by [`install`] when a listener is already in place.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("a pointer listener is already installed")]
pub struct InstallError;

fn slot() -> MutexGuard<'static, Slot> {
    // A fatal error that unwinds out of `with_listener` poisons the lock
    // without leaving the listener in a broken state.
    LISTENER.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Makes `listener` the process-wide listener.
pub fn install(listener: impl Listener + Send + 'static) -> Result<(), InstallError> {
    let mut slot = slot();
    if slot.is_some() {
        return Err(InstallError);
    }
    *slot = Some(Box::new(listener));
    tracing::debug!("pointer listener installed");
    Ok(())
}

/// Builds a listener with `factory` and installs it.
///
/// Nothing is built if a listener is already installed.
pub fn install_from<F>(
    factory: &F,
    options: &Options,
    platform: Arc<dyn Platform>,
) -> Result<(), InstallError>
where
    F: ListenerFactory,
    F::Listener: Send + 'static,
{
    let mut slot = slot();
    if slot.is_some() {
        return Err(InstallError);
    }
    *slot = Some(Box::new(factory.create_listener(options, platform)));
    tracing::debug!("pointer listener installed");
    Ok(())
}

/// Whether a listener is installed.
pub fn is_installed() -> bool {
    slot().is_some()
}

/// Runs `f` with exclusive access to the installed listener.
///
/// Returns `None` without calling `f` if no listener is installed.
pub fn with_listener<R>(f: impl FnOnce(&mut dyn Listener) -> R) -> Option<R> {
    let mut slot = slot();
    let listener = slot.as_deref_mut()?;
    Some(f(listener))
}

/// Removes the installed listener and hands it back for destruction.
pub fn uninstall() -> Option<Box<dyn Listener + Send>> {
    let listener = slot().take();
    if listener.is_some() {
        tracing::debug!("pointer listener uninstalled");
    }
    listener
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::{
        messages::{PointerError, PointerWarning},
        testing::{Event, EventLog},
    };

    // The slot is shared by every test in this binary, so the whole
    // lifecycle is exercised in a single test.
    #[test]
    fn test_slot_lifecycle() {
        assert!(uninstall().is_none());
        assert_eq!(with_listener(|listener| listener.maximum_leaks_to_report()), None);

        let log = EventLog::new(3);
        install(log.clone()).unwrap();
        assert!(is_installed());
        assert_eq!(install(EventLog::new(1)), Err(InstallError));

        assert_eq!(with_listener(|listener| listener.maximum_leaks_to_report()), Some(3));
        with_listener(|listener| listener.warning(&PointerWarning::LeakOutOfScope));

        let error = PointerError::array_index_out_of_bounds(-1, 9);
        let unwound = catch_unwind(AssertUnwindSafe(|| {
            with_listener(|listener| {
                listener.error(&error);
            });
        }));
        assert!(unwound.is_err());

        // Still usable after a fatal error unwound through the lock.
        with_listener(|listener| listener.warning(&PointerWarning::LeakOverwritten));
        assert_eq!(
            log.events(),
            [
                Event::Warning(PointerWarning::LeakOutOfScope.to_string()),
                Event::Error(error.to_string()),
                Event::Warning(PointerWarning::LeakOverwritten.to_string()),
            ]
        );

        assert!(uninstall().is_some());
        assert!(!is_installed());
        assert!(uninstall().is_none());
    }
}
