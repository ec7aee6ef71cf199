#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Native stack capture and symbolication for `dereferee` listeners.
//!
//! [`NativePlatform`] implements [`Platform`] on top of the platform's own
//! unwinder and debug information. Backtraces are captured as bare return
//! addresses so the checked pointer engine can store them cheaply with every
//! allocation, and are only resolved to function names and source locations
//! when a listener prints them.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use dereferee::{
//!     ListenerFactory, Options,
//!     listener::plain::PlainFactory,
//! };
//! use dereferee_backtrace::NativePlatform;
//!
//! let platform = Arc::new(NativePlatform::new_from_env());
//! let listener = PlainFactory::new().create_listener(&Options::new(), platform);
//! # drop(listener);
//! ```
//!
//! # Source paths
//!
//! Paths into the Rust standard library sources and the cargo registry are
//! shortened to start at the crate directory:
//!
//! ```text
//! [..]/std/src/panicking.rs
//! [..]/regex-1.12.2/src/regex/string.rs
//! ```
//!
//! Other paths are printed as recorded in the debug information.
//!
//! # Environment Variables
//!
//! - `RUST_BACKTRACE=full` - Captures every frame and shows full paths
//! - `DEREFEREE_BACKTRACE` - Comma-separated options:
//!   - `full_paths` - Show full file paths instead of shortened paths

use std::{borrow::Cow, ffi::c_void, ptr, sync::OnceLock};

use dereferee::{
    Address,
    backtrace::{FrameInfo, Platform},
};

/// A [`Platform`] backed by the native unwinder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NativePlatform {
    /// The maximum number of return addresses captured per backtrace.
    pub max_frame_count: usize,
    /// Whether source paths are printed in full.
    pub show_full_path: bool,
}

impl NativePlatform {
    /// Captures up to 64 frames and shortens well-known source paths.
    pub const DEFAULT: Self = Self {
        max_frame_count: 64,
        show_full_path: false,
    };

    /// Creates a platform with the [`DEFAULT`](Self::DEFAULT) settings.
    pub const fn new() -> Self {
        Self::DEFAULT
    }

    /// Creates a platform configured from the environment.
    ///
    /// See the [crate documentation](crate#environment-variables) for the
    /// variables that are read.
    pub fn new_from_env() -> Self {
        let env = EnvOptions::get();
        Self {
            max_frame_count: if env.capture_all_frames {
                usize::MAX
            } else {
                Self::DEFAULT.max_frame_count
            },
            show_full_path: env.show_full_path,
        }
    }

    /// Limits captured backtraces to `max_frame_count` frames.
    pub const fn with_max_frame_count(mut self, max_frame_count: usize) -> Self {
        self.max_frame_count = max_frame_count;
        self
    }

    /// Prints source paths exactly as recorded.
    pub const fn with_full_paths(mut self, show_full_path: bool) -> Self {
        self.show_full_path = show_full_path;
        self
    }

    fn file_name(&self, path: String) -> String {
        if self.show_full_path {
            path
        } else {
            shorten_path(&path).into_owned()
        }
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Platform for NativePlatform {
    fn frame_info(&self, address: Address) -> Option<FrameInfo> {
        let mut info = None;
        // Inlined calls resolve to several symbols, innermost first.
        backtrace::resolve(ptr::without_provenance_mut::<c_void>(address.0), |symbol| {
            if info.is_some() {
                return;
            }
            let Some(name) = symbol.name() else {
                return;
            };
            let file_name = symbol
                .filename_raw()
                .map(|path| self.file_name(path.to_string()))
                .unwrap_or_default();
            info = Some(FrameInfo {
                function: format!("{name:#}"),
                file_name,
                line: symbol.lineno(),
            });
        });
        info
    }

    fn capture_backtrace(&self) -> Option<Vec<Address>> {
        if self.max_frame_count == 0 {
            return None;
        }
        let mut addresses = Vec::new();
        backtrace::trace(|frame| {
            addresses.push(Address(frame.ip().addr()));
            addresses.len() < self.max_frame_count
        });
        (!addresses.is_empty()).then_some(addresses)
    }
}

/// Shortens a source path into the standard library or the cargo registry
/// to `[..]/` followed by the path from the crate directory on.
pub fn shorten_path(path: &str) -> Cow<'_, str> {
    static SOURCE_ROOTS: OnceLock<regex::Regex> = OnceLock::new();
    let source_roots = SOURCE_ROOTS.get_or_init(|| {
        regex::Regex::new(concat!(
            // toolchain sources, installed or remapped to /rustc/<commit>
            r"(?:/lib/rustlib/src/rust|^/rustc/[0-9a-f]{40})/library/",
            r"(?P<std>(?:std|core|alloc)/src/.*)$",
            // unpacked registry crates: <registry>-<hash>/<name>-<version>/
            r"|/\.cargo/registry/src/[^/]+-[0-9a-f]{16}/",
            r"(?P<registry>[^./]+-[0-9]+\.[^/]*/src/.*)$",
        ))
        .expect("source root pattern is a valid regex")
    });

    let Some(captures) = source_roots.captures(path) else {
        return Cow::Borrowed(path);
    };
    match captures.name("std").or_else(|| captures.name("registry")) {
        Some(crate_dir) => Cow::Owned(format!("[..]/{}", crate_dir.as_str())),
        None => Cow::Borrowed(path),
    }
}

/// Settings read once from the environment.
#[derive(Debug)]
struct EnvOptions {
    capture_all_frames: bool,
    show_full_path: bool,
}

impl EnvOptions {
    fn get() -> &'static Self {
        static OPTIONS: OnceLock<EnvOptions> = OnceLock::new();
        OPTIONS.get_or_init(|| {
            Self::parse(env_var("RUST_BACKTRACE"), env_var("DEREFEREE_BACKTRACE"))
        })
    }

    fn parse(rust_backtrace: Option<String>, dereferee_backtrace: Option<String>) -> Self {
        let capture_all_frames = rust_backtrace.as_deref() == Some("full");
        let full_paths_requested = dereferee_backtrace.is_some_and(|flags| {
            flags
                .split(',')
                .any(|flag| flag.trim().eq_ignore_ascii_case("full_paths"))
        });
        Self {
            capture_all_frames,
            show_full_path: capture_all_frames || full_paths_requested,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
}
