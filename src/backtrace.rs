//! Symbolication and rendering of backtraces.
//!
//! The engine records backtraces as bare return addresses. Turning them into
//! function names and source locations is the job of a [`Platform`], and
//! deciding which frames are worth showing is the job of a [`FrameFilter`].
//! [`BacktraceRenderer`] puts the two together and prints an aligned,
//! labeled block:
//!
//! ```text
//!   allocated in: make_list (list.cpp:12)
//!                 main (main.cpp:40)
//! ```
//!
//! Frames that fail to resolve, or that the filter rejects, are skipped
//! without leaving a trace. The label goes on the first frame that survives,
//! and a backtrace with no surviving frames prints nothing at all.

use core::fmt;

use regex::Regex;

use crate::{
    model::{self, Address},
    output::OutputChannel,
};

/// Width of the right-aligned label column.
pub const LABEL_WIDTH: usize = 14;

/// Symbol information for a single return address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// The (already demangled) function name.
    pub function: String,
    /// The source file, possibly shortened.
    pub file_name: String,
    /// The source line, if known.
    pub line: Option<u32>,
}

impl FrameInfo {
    /// Creates frame information with a known source location.
    pub fn new(function: impl Into<String>, file_name: impl Into<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            file_name: file_name.into(),
            line: Some(line),
        }
    }

    /// Creates frame information for a function without line information.
    pub fn function_only(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) if line != 0 => write!(f, "{} ({}:{line})", self.function, self.file_name),
            _ => f.write_str(&self.function),
        }
    }
}

/// The platform services a listener relies on.
///
/// Implemented by the host; see the `dereferee-backtrace` crate for one
/// backed by the platform's native unwinder and debug information.
pub trait Platform: Send + Sync {
    /// Resolves `address` to a function and source location.
    ///
    /// Returns `None` when the address cannot be symbolicated.
    fn frame_info(&self, address: Address) -> Option<FrameInfo>;

    /// Captures the return addresses of the current call stack.
    ///
    /// The returned addresses are released when the vector is dropped.
    fn capture_backtrace(&self) -> Option<Vec<Address>>;
}

impl<P: Platform + ?Sized> Platform for std::sync::Arc<P> {
    fn frame_info(&self, address: Address) -> Option<FrameInfo> {
        (**self).frame_info(address)
    }

    fn capture_backtrace(&self) -> Option<Vec<Address>> {
        (**self).capture_backtrace()
    }
}

/// Decides which resolved frames appear in a rendered backtrace.
pub trait FrameFilter {
    /// Returns true if the frame of `function` should be shown.
    fn keep(&self, function: &str) -> bool;
}

impl<F: Fn(&str) -> bool> FrameFilter for F {
    fn keep(&self, function: &str) -> bool {
        self(function)
    }
}

/// Hides frames that belong to the checked pointer runtime itself.
#[derive(Copy, Clone, Debug)]
pub struct RuntimeFrameFilter {
    /// Functions starting with any of these prefixes are hidden.
    pub hidden_prefixes: &'static [&'static str],
}

impl RuntimeFrameFilter {
    /// Hides the runtime's C++ namespace, the Rust crates of this workspace
    /// and the unwinder.
    pub const DEFAULT: Self = Self {
        hidden_prefixes: &[
            "Dereferee",
            "backtrace::",
            "dereferee::",
            "<dereferee::",
            "dereferee_backtrace::",
            "<dereferee_backtrace::",
        ],
    };
}

impl Default for RuntimeFrameFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FrameFilter for RuntimeFrameFilter {
    fn keep(&self, function: &str) -> bool {
        !self
            .hidden_prefixes
            .iter()
            .any(|prefix| function.starts_with(prefix))
    }
}

/// Hides frames whose function name matches a regular expression.
#[derive(Clone, Debug)]
pub struct PatternFrameFilter {
    hidden: Regex,
}

impl PatternFrameFilter {
    /// Frames of the runtime, the Rust standard library and the test
    /// harness, and the process entry machinery.
    pub const TEST_HARNESS_PATTERN: &'static str = concat!(
        r"^(?:<?(?:dereferee|dereferee_backtrace|std|core|alloc|test|backtrace)::",
        r"|Dereferee|CxxTest::",
        r"|__rust_begin_short_backtrace|__rust_try|__libc_start|_start$|start_thread$)",
    );

    /// Hides every function matching `pattern`.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            hidden: Regex::new(pattern)?,
        })
    }

    /// The filter a test harness host uses unless it supplies its own.
    pub fn test_harness() -> Self {
        Self::new(Self::TEST_HARNESS_PATTERN)
            .expect("built-in test harness frame pattern should be valid")
    }
}

impl FrameFilter for PatternFrameFilter {
    fn keep(&self, function: &str) -> bool {
        !self.hidden.is_match(function)
    }
}

/// Prints backtraces through an [`OutputChannel`].
pub struct BacktraceRenderer<'a> {
    platform: &'a dyn Platform,
    filter: &'a dyn FrameFilter,
}

impl<'a> BacktraceRenderer<'a> {
    /// Resolves frames with `platform` and keeps those `filter` accepts.
    pub fn new(platform: &'a dyn Platform, filter: &'a dyn FrameFilter) -> Self {
        Self { platform, filter }
    }

    /// Renders `backtrace` under `label` and returns the number of lines
    /// written.
    ///
    /// The sequence ends at its first null address.
    pub fn render(
        &self,
        channel: &mut OutputChannel,
        backtrace: Option<&[Address]>,
        label: &str,
    ) -> usize {
        let Some(backtrace) = backtrace else {
            return 0;
        };

        let mut lines = 0;
        for address in model::frames(backtrace) {
            let Some(frame) = self.platform.frame_info(address) else {
                continue;
            };
            if !self.filter.keep(&frame.function) {
                continue;
            }

            if lines == 0 {
                channel.line(format_args!("{label:>LABEL_WIDTH$}: {frame}"));
            } else {
                channel.line(format_args!("{:indent$}{frame}", "", indent = LABEL_WIDTH + 2));
            }
            lines += 1;
        }
        lines
    }

    /// Captures the current call stack and renders it under `label`.
    pub fn render_current(&self, channel: &mut OutputChannel, label: &str) -> usize {
        let backtrace = self.platform.capture_backtrace();
        self.render(channel, backtrace.as_deref(), label)
    }
}

impl fmt::Debug for BacktraceRenderer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BacktraceRenderer").finish_non_exhaustive()
    }
}
