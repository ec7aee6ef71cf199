//! How a fatal pointer error stops execution.
//!
//! Reporting a pointer error never returns. The default is to abort the
//! process. Some hosts intercept the abort signal and kill the process before
//! their own recovery code gets a chance to mark the current test as failed
//! and move on. Those hosts do catch invalid memory accesses, so the listener
//! can provoke one of those instead. A Rust test harness recovers from
//! panics, which is what [`Termination::Unwind`] provides.

use core::{fmt, ptr, str::FromStr};

/// The strategy used to stop execution after a fatal pointer error.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Termination {
    /// Raise the abnormal termination signal.
    Abort,
    /// Trigger an invalid memory access for the host's fault handler.
    AccessFault,
    /// Panic with a [`PointerFault`] payload.
    Unwind,
}

impl Termination {
    /// The strategy suited to the compilation target.
    ///
    /// Windows-family targets hard-kill the process on abort, so they get
    /// [`Termination::AccessFault`]. Everything else aborts.
    pub const fn for_target() -> Self {
        if cfg!(any(windows, target_os = "cygwin")) {
            Termination::AccessFault
        } else {
            Termination::Abort
        }
    }

    /// Stops execution. `message` is the already formatted error text.
    pub fn terminate(self, message: &str) -> ! {
        match self {
            Termination::Abort => std::process::abort(),
            Termination::AccessFault => access_fault(),
            Termination::Unwind => std::panic::panic_any(PointerFault {
                message: message.to_owned(),
            }),
        }
    }
}

impl Default for Termination {
    fn default() -> Self {
        Self::for_target()
    }
}

/// Raised when an unrecognized termination policy name is parsed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown fatal policy {0:?}, expected one of: abort, fault, unwind")]
pub struct UnknownPolicy(pub String);

impl FromStr for Termination {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "abort" => Ok(Termination::Abort),
            "fault" => Ok(Termination::AccessFault),
            "unwind" => Ok(Termination::Unwind),
            other => Err(UnknownPolicy(other.to_owned())),
        }
    }
}

/// The panic payload of [`Termination::Unwind`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerFault {
    /// The formatted error message.
    pub message: String,
}

impl fmt::Display for PointerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer error: {}", self.message)
    }
}

impl std::error::Error for PointerFault {}

fn access_fault() -> ! {
    // Page zero is never mapped. Debug builds reject a null
    // `write_volatile` with an abort before the store is issued.
    let address = ptr::without_provenance_mut::<u32>(0x10);
    // SAFETY: not sound, on purpose. The write faults and the host's fault
    // handler takes over before execution continues. Rust's own SIGSEGV
    // handler restores the default action and the write is retried.
    unsafe {
        address.write_volatile(0x0BAD_BEEF);
    }
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("abort".parse(), Ok(Termination::Abort));
        assert_eq!(" fault ".parse(), Ok(Termination::AccessFault));
        assert_eq!("unwind".parse(), Ok(Termination::Unwind));
        assert_eq!(
            "halt".parse::<Termination>(),
            Err(UnknownPolicy("halt".to_owned()))
        );
    }

    #[test]
    fn test_target_default() {
        if cfg!(windows) {
            assert_eq!(Termination::default(), Termination::AccessFault);
        } else if cfg!(unix) && !cfg!(target_os = "cygwin") {
            assert_eq!(Termination::default(), Termination::Abort);
        }
    }

    #[test]
    fn test_unwind_carries_message() {
        let payload = std::panic::catch_unwind(|| {
            Termination::Unwind.terminate("boom");
        })
        .expect_err("terminate never returns");
        let fault = payload
            .downcast_ref::<PointerFault>()
            .expect("payload is a PointerFault");
        assert_eq!(fault.message, "boom");
        assert_eq!(fault.to_string(), "Pointer error: boom");
    }
}
