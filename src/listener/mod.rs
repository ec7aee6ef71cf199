//! The contract between the checked pointer engine and its reporting backend.
//!
//! The engine drives a [`Listener`] synchronously from whichever thread
//! detected a condition:
//!
//! - [`Listener::error`] and [`Listener::warning`] are called the moment a
//!   misuse is detected. Errors never return.
//! - At the end of a run the engine walks its leaked allocations:
//!   [`begin_report`](Listener::begin_report), one
//!   [`report_leak`](Listener::report_leak) per leak up to
//!   [`maximum_leaks_to_report`](Listener::maximum_leaks_to_report),
//!   [`report_truncated`](Listener::report_truncated) if it stopped early, and
//!   finally [`end_report`](Listener::end_report).
//!
//! Two backends are provided. [`plain::PlainListener`] prints everything to a
//! standard stream, and [`harness::HarnessListener`] turns errors and warnings
//! into test framework failures and warnings. Both are built by a
//! [`ListenerFactory`] from the engine's option list.

pub mod harness;
pub mod plain;

use core::fmt;
use std::sync::Arc;

use crate::{
    backtrace::{BacktraceRenderer, FrameFilter, Platform},
    messages::{PointerError, PointerWarning},
    model::{AllocationInfo, UsageStats, UserTag},
    options::{ListenerConfig, Options},
    output::{OutputChannel, OutputStreams},
};

/// A reporting backend driven by the checked pointer engine.
pub trait Listener {
    /// How many leaks the engine reports individually before calling
    /// [`report_truncated`](Self::report_truncated).
    fn maximum_leaks_to_report(&self) -> usize;

    /// The tag to attach permanently to a new allocation.
    ///
    /// The tag comes back as [`AllocationInfo::user_info`] when the
    /// allocation is reported as a leak.
    fn get_allocation_user_info(&self, allocation: &AllocationInfo<'_>) -> UserTag {
        let _ = allocation;
        UserTag::NONE
    }

    /// Starts the end-of-run leak report.
    ///
    /// Called exactly once, even when nothing leaked.
    fn begin_report(&mut self, stats: &UsageStats);

    /// Whether a leak should count towards the report at all.
    fn should_report_leak(&self, leak: &AllocationInfo<'_>) -> bool {
        let _ = leak;
        true
    }

    /// Reports one leaked allocation.
    fn report_leak(&mut self, leak: &AllocationInfo<'_>);

    /// Notes that only `reports_logged` of `actual_leaks` leaks were shown.
    fn report_truncated(&mut self, reports_logged: usize, actual_leaks: usize);

    /// Finishes the report with the statistics passed to
    /// [`begin_report`](Self::begin_report).
    fn end_report(&mut self);

    /// Reports a fatal pointer error and stops execution.
    fn error(&mut self, error: &PointerError) -> !;

    /// Reports a recoverable pointer problem.
    fn warning(&mut self, warning: &PointerWarning);
}

impl<L: Listener + ?Sized> Listener for Box<L> {
    fn maximum_leaks_to_report(&self) -> usize {
        (**self).maximum_leaks_to_report()
    }

    fn get_allocation_user_info(&self, allocation: &AllocationInfo<'_>) -> UserTag {
        (**self).get_allocation_user_info(allocation)
    }

    fn begin_report(&mut self, stats: &UsageStats) {
        (**self).begin_report(stats);
    }

    fn should_report_leak(&self, leak: &AllocationInfo<'_>) -> bool {
        (**self).should_report_leak(leak)
    }

    fn report_leak(&mut self, leak: &AllocationInfo<'_>) {
        (**self).report_leak(leak);
    }

    fn report_truncated(&mut self, reports_logged: usize, actual_leaks: usize) {
        (**self).report_truncated(reports_logged, actual_leaks);
    }

    fn end_report(&mut self) {
        (**self).end_report();
    }

    fn error(&mut self, error: &PointerError) -> ! {
        (**self).error(error)
    }

    fn warning(&mut self, warning: &PointerWarning) {
        (**self).warning(warning);
    }
}

/// Creates and destroys the listener for a run.
///
/// The engine calls [`create_listener`](Self::create_listener) once at
/// startup and hands the listener back to
/// [`destroy_listener`](Self::destroy_listener) at shutdown.
pub trait ListenerFactory {
    /// The listener this factory builds.
    type Listener: Listener;

    /// Builds a listener from the engine's options.
    fn create_listener(&self, options: &Options, platform: Arc<dyn Platform>) -> Self::Listener;

    /// Releases a listener and everything it owns.
    fn destroy_listener(&self, listener: Self::Listener) {
        drop(listener);
    }
}

/// Produces the standard streams for each listener a factory builds.
pub type StreamSource = Box<dyn Fn() -> OutputStreams + Send + Sync>;

pub(crate) fn standard_streams() -> StreamSource {
    Box::new(OutputStreams::standard)
}

/// `(T)`, `(T[n])` or `(T[])` followed by a space, or nothing for an
/// untyped allocation.
struct LeakAnnotation<'a>(&'a AllocationInfo<'a>);

impl fmt::Display for LeakAnnotation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let leak = self.0;
        let Some(type_name) = leak.type_name else {
            return Ok(());
        };
        match (leak.is_array, leak.array_size) {
            (false, _) => write!(f, "({type_name}) "),
            (true, 0) => write!(f, "({type_name}[]) "),
            (true, count) => write!(f, "({type_name}[{count}]) "),
        }
    }
}

/// The human readable leak report shared by both backends.
pub(crate) struct LeakReportWriter {
    pub(crate) channel: OutputChannel,
    pub(crate) platform: Arc<dyn Platform>,
    max_leaks: usize,
    stats: Option<UsageStats>,
}

impl LeakReportWriter {
    pub(crate) fn new(
        config: &ListenerConfig,
        streams: OutputStreams,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            channel: OutputChannel::open(config, streams),
            platform,
            max_leaks: config.max_leaks_to_report,
            stats: None,
        }
    }

    pub(crate) fn max_leaks(&self) -> usize {
        self.max_leaks
    }

    pub(crate) fn begin(&mut self, stats: &UsageStats) {
        self.stats = Some(*stats);
        if stats.leaks > 0 {
            self.channel
                .line(format_args!("{} memory leaks were detected:", stats.leaks));
            self.channel.line(format_args!("--------"));
        } else {
            self.channel.line(format_args!("No memory leaks detected."));
        }
    }

    pub(crate) fn leak(&mut self, leak: &AllocationInfo<'_>, filter: &dyn FrameFilter) {
        self.channel.line(format_args!(
            "Leaked {} bytes {}at address {}",
            leak.block_size,
            LeakAnnotation(leak),
            leak.address
        ));
        BacktraceRenderer::new(&*self.platform, filter).render(
            &mut self.channel,
            leak.backtrace,
            "allocated in",
        );
        self.channel.blank();
    }

    pub(crate) fn truncated(&mut self, reports_logged: usize, actual_leaks: usize) {
        self.channel.blank();
        self.channel.line(format_args!(
            "(only {reports_logged} of {actual_leaks} leaks shown)"
        ));
    }

    /// Prints the statistics block and returns the statistics it printed.
    pub(crate) fn end(&mut self) -> Option<UsageStats> {
        let Some(stats) = self.stats else {
            tracing::warn!("end_report called before begin_report");
            return None;
        };
        let channel = &mut self.channel;
        channel.blank();
        channel.line(format_args!("Memory usage statistics:"));
        channel.line(format_args!("--------"));
        channel.line(format_args!(
            "Total memory allocated during execution:   {} bytes",
            stats.total_bytes_allocated
        ));
        channel.line(format_args!(
            "Maximum memory in use during execution:    {} bytes",
            stats.maximum_bytes_in_use
        ));
        channel.line(format_args!(
            "Number of calls to new:                    {}",
            stats.calls_to_new
        ));
        channel.line(format_args!(
            "Number of calls to delete (non-null):      {}",
            stats.calls_to_delete
        ));
        channel.line(format_args!(
            "Number of calls to new[]:                  {}",
            stats.calls_to_array_new
        ));
        channel.line(format_args!(
            "Number of calls to delete[] (non-null):    {}",
            stats.calls_to_array_delete
        ));
        channel.line(format_args!(
            "Number of calls to delete (null):          {}",
            stats.calls_to_delete_null
        ));
        channel.line(format_args!(
            "Number of calls to delete[] (null):        {}",
            stats.calls_to_array_delete_null
        ));
        Some(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backtrace::RuntimeFrameFilter,
        model::Address,
        testing::{ScriptedPlatform, SharedBuffer},
    };

    static_assertions::assert_obj_safe!(Listener);
    static_assertions::assert_impl_all!(plain::PlainListener: Listener, Send);
    static_assertions::assert_impl_all!(
        harness::HarnessListener<harness::LibtestHost>: Listener,
        Send
    );

    fn writer(buffer: &SharedBuffer) -> LeakReportWriter {
        LeakReportWriter::new(
            &ListenerConfig::default(),
            OutputStreams::new(buffer.clone(), std::io::sink()),
            Arc::new(ScriptedPlatform::new()),
        )
    }

    #[test]
    fn test_leak_annotations() {
        let buffer = SharedBuffer::new();
        let mut writer = writer(&buffer);
        let filter = RuntimeFrameFilter::DEFAULT;
        writer.leak(&AllocationInfo::new(Address(0x10), 4), &filter);
        writer.leak(
            &AllocationInfo::new(Address(0x20), 8).with_type_name("int"),
            &filter,
        );
        writer.leak(
            &AllocationInfo::new(Address(0x30), 12)
                .with_type_name("int")
                .with_array_size(3),
            &filter,
        );
        writer.leak(
            &AllocationInfo::new(Address(0x40), 12)
                .with_type_name("int")
                .with_array_size(0),
            &filter,
        );
        assert_eq!(
            buffer.lines(),
            [
                "Leaked 4 bytes at address 0x10",
                "",
                "Leaked 8 bytes (int) at address 0x20",
                "",
                "Leaked 12 bytes (int[3]) at address 0x30",
                "",
                "Leaked 12 bytes (int[]) at address 0x40",
                "",
            ]
        );
    }

    #[test]
    fn test_end_without_begin_prints_nothing() {
        let buffer = SharedBuffer::new();
        let mut writer = writer(&buffer);
        assert_eq!(writer.end(), None);
        assert_eq!(buffer.contents(), "");
    }

    #[test]
    fn test_zero_leak_header() {
        let buffer = SharedBuffer::new();
        let mut writer = writer(&buffer);
        writer.begin(&UsageStats::default());
        assert_eq!(buffer.contents(), "No memory leaks detected.\n");
        assert_eq!(writer.end(), Some(UsageStats::default()));
    }
}
