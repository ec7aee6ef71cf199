//! A listener that prints everything to a standard stream.
//!
//! Output goes to stdout, or to stderr when `use.stderr` is `"true"`. Every
//! line carries the configured `output.prefix`:
//!
//! ```text
//! Pointer error: Dereferenced null pointer using operator*
//!       error in: visit (tree.cpp:31)
//!                 main (main.cpp:12)
//!
//! ```

use std::sync::Arc;

use crate::{
    backtrace::{BacktraceRenderer, Platform, RuntimeFrameFilter},
    listener::{LeakReportWriter, Listener, ListenerFactory, StreamSource, standard_streams},
    messages::{PointerError, PointerWarning},
    model::{AllocationInfo, UsageStats},
    options::{ListenerConfig, Options},
    output::OutputStreams,
    termination::Termination,
};

/// Prints reports, errors and warnings as plain text.
pub struct PlainListener {
    writer: LeakReportWriter,
    filter: RuntimeFrameFilter,
    termination: Termination,
}

impl PlainListener {
    /// Creates a listener writing to the process's standard streams.
    pub fn new(config: &ListenerConfig, platform: Arc<dyn Platform>) -> Self {
        Self::with_streams(config, platform, OutputStreams::standard())
    }

    /// Creates a listener writing to the given streams.
    pub fn with_streams(
        config: &ListenerConfig,
        platform: Arc<dyn Platform>,
        streams: OutputStreams,
    ) -> Self {
        tracing::debug!(
            use_stderr = config.use_stderr,
            max_leaks = config.max_leaks_to_report,
            "creating plain listener"
        );
        Self {
            writer: LeakReportWriter::new(config, streams, platform),
            filter: RuntimeFrameFilter::DEFAULT,
            termination: config.termination,
        }
    }

    /// Replaces the filter deciding which backtrace frames are shown.
    pub fn with_frame_filter(mut self, filter: RuntimeFrameFilter) -> Self {
        self.filter = filter;
        self
    }

    fn current_backtrace(&mut self, label: &str) {
        let writer = &mut self.writer;
        BacktraceRenderer::new(&*writer.platform, &self.filter)
            .render_current(&mut writer.channel, label);
        writer.channel.blank();
    }
}

impl Listener for PlainListener {
    fn maximum_leaks_to_report(&self) -> usize {
        self.writer.max_leaks()
    }

    fn begin_report(&mut self, stats: &UsageStats) {
        self.writer.begin(stats);
    }

    fn report_leak(&mut self, leak: &AllocationInfo<'_>) {
        self.writer.leak(leak, &self.filter);
    }

    fn report_truncated(&mut self, reports_logged: usize, actual_leaks: usize) {
        self.writer.truncated(reports_logged, actual_leaks);
    }

    fn end_report(&mut self) {
        self.writer.end();
    }

    fn error(&mut self, error: &PointerError) -> ! {
        let message = error.to_string();
        self.writer
            .channel
            .line(format_args!("Pointer error: {message}"));
        self.current_backtrace("error in");
        self.termination.terminate(&message)
    }

    fn warning(&mut self, warning: &PointerWarning) {
        self.writer
            .channel
            .line(format_args!("Pointer warning: {warning}"));
        self.current_backtrace("warning in");
    }
}

/// Builds [`PlainListener`]s.
pub struct PlainFactory {
    streams: StreamSource,
}

impl PlainFactory {
    /// A factory whose listeners write to the standard streams.
    pub fn new() -> Self {
        Self {
            streams: standard_streams(),
        }
    }

    /// A factory whose listeners write to the streams `streams` returns.
    pub fn with_streams(streams: impl Fn() -> OutputStreams + Send + Sync + 'static) -> Self {
        Self {
            streams: Box::new(streams),
        }
    }
}

impl Default for PlainFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerFactory for PlainFactory {
    type Listener = PlainListener;

    fn create_listener(&self, options: &Options, platform: Arc<dyn Platform>) -> PlainListener {
        let config = ListenerConfig::from_options(options);
        PlainListener::with_streams(&config, platform, (self.streams)())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::{
        backtrace::FrameInfo,
        messages::{CorruptionLocation, ErrorCode},
        model::Address,
        termination::PointerFault,
        testing::{ScriptedPlatform, SharedBuffer},
    };

    fn platform() -> Arc<ScriptedPlatform> {
        Arc::new(
            ScriptedPlatform::new()
                .with_frame(0x1, FrameInfo::new("Dereferee::listener::error", "listener.cpp", 5))
                .with_frame(0x2, FrameInfo::new("visit", "tree.cpp", 31))
                .with_frame(0x3, FrameInfo::new("main", "main.cpp", 12))
                .with_current_backtrace([0x1, 0x2, 0x3]),
        )
    }

    fn listener(options: &[(&str, &str)], buffer: &SharedBuffer) -> PlainListener {
        let buffer = buffer.clone();
        PlainFactory::with_streams(move || OutputStreams::new(buffer.clone(), std::io::sink()))
            .create_listener(&Options::from_pairs(options.iter().copied()), platform())
    }

    #[test]
    fn test_warning_prints_current_backtrace() {
        let buffer = SharedBuffer::new();
        let mut listener = listener(&[], &buffer);
        listener.warning(&PointerWarning::MemoryBoundaryCorrupted(CorruptionLocation::After));
        assert_eq!(
            buffer.lines(),
            [
                "Pointer warning: Memory after allocated block was corrupted, likely due to invalid array indexing or pointer arithmetic",
                "    warning in: visit (tree.cpp:31)",
                "                main (main.cpp:12)",
                "",
            ]
        );
    }

    #[test]
    fn test_error_prints_then_unwinds() {
        let buffer = SharedBuffer::new();
        let mut listener = listener(&[("fatal.policy", "unwind"), ("output.prefix", "# ")], &buffer);
        let error = PointerError::new(ErrorCode::StarNull).unwrap();
        let payload = catch_unwind(AssertUnwindSafe(|| {
            listener.error(&error);
        }))
        .expect_err("error never returns");
        assert_eq!(
            payload.downcast_ref::<PointerFault>().map(|f| f.message.as_str()),
            Some("Dereferenced null pointer using operator*")
        );
        assert_eq!(
            buffer.lines(),
            [
                "# Pointer error: Dereferenced null pointer using operator*",
                "#       error in: visit (tree.cpp:31)",
                "#                 main (main.cpp:12)",
                "# ",
            ]
        );
    }

    #[test]
    fn test_leak_report() {
        let buffer = SharedBuffer::new();
        let mut listener = listener(&[], &buffer);
        let trace = [Address(0x2), Address(0x3), Address::NULL];
        let stats = UsageStats {
            leaks: 1,
            total_bytes_allocated: 96,
            maximum_bytes_in_use: 64,
            calls_to_new: 3,
            calls_to_delete: 2,
            calls_to_array_new: 1,
            calls_to_array_delete: 1,
            calls_to_delete_null: 4,
            calls_to_array_delete_null: 0,
        };
        listener.begin_report(&stats);
        listener.report_leak(
            &AllocationInfo::new(Address(0xbeef0), 32)
                .with_type_name("Node")
                .with_backtrace(&trace),
        );
        listener.end_report();
        assert_eq!(
            buffer.contents(),
            "1 memory leaks were detected:\n\
             --------\n\
             Leaked 32 bytes (Node) at address 0xbeef0\n  \
             allocated in: visit (tree.cpp:31)\n                \
             main (main.cpp:12)\n\
             \n\
             \n\
             Memory usage statistics:\n\
             --------\n\
             Total memory allocated during execution:   96 bytes\n\
             Maximum memory in use during execution:    64 bytes\n\
             Number of calls to new:                    3\n\
             Number of calls to delete (non-null):      2\n\
             Number of calls to new[]:                  1\n\
             Number of calls to delete[] (non-null):    1\n\
             Number of calls to delete (null):          4\n\
             Number of calls to delete[] (null):        0\n"
        );
    }

    #[test]
    fn test_leak_without_backtrace_omits_label() {
        let buffer = SharedBuffer::new();
        let mut listener = listener(&[], &buffer);
        listener.report_leak(&AllocationInfo::new(Address(0x10), 1));
        assert_eq!(buffer.lines(), ["Leaked 1 bytes at address 0x10", ""]);
    }
}
