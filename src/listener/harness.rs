//! A listener that reports through a unit test framework.
//!
//! Pointer errors become failures of the test that is currently running and
//! pointer warnings become test framework warnings. The end-of-run leak
//! report is printed like the plain listener's, and can additionally be
//! summarized as statements in a statistics file named by
//! `webcat.stats.path`:
//!
//! ```text
//! $results->setNumLeaks(2);
//! $results->setMemoryAmounts(1024, 512);
//! $results->setNumCalls(10, 8, 2, 2, 1);
//! ```
//!
//! The framework also gets a say in which allocations are leak-checked: every
//! allocation is tagged by [`TestHost::allocation_tag`] when it is created,
//! and allocations whose tag has [`UserTag::SUPPRESS_BIT`] set are left out
//! of the report.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    backtrace::{FrameFilter, PatternFrameFilter, Platform},
    listener::{LeakReportWriter, Listener, ListenerFactory, StreamSource, standard_streams},
    messages::{PointerError, PointerWarning},
    model::{AllocationInfo, UsageStats, UserTag},
    options::{FATAL_POLICY, ListenerConfig, Options},
    output::{OutputStreams, StatsChannel},
    termination::Termination,
};

/// The test framework a [`HarnessListener`] reports to.
pub trait TestHost: Send {
    /// Records `message` as the reason the current test failed.
    ///
    /// Execution is stopped right after this returns.
    fn fail_current_test(&mut self, message: &str);

    /// Reports a warning against the current test.
    fn warn(&mut self, message: &str);

    /// The tag to attach to an allocation made now.
    fn allocation_tag(&self) -> UserTag;

    /// Whether a backtrace frame belongs in reports.
    fn keep_frame(&self, function: &str) -> bool;

    /// How errors stop execution when `fatal.policy` is not given.
    fn default_termination(&self) -> Termination {
        Termination::for_target()
    }
}

/// A [`TestHost`] for Rust's built-in test harness.
///
/// Failures and warnings are logged through `tracing`. The failure itself
/// reaches the harness as the panic raised by [`Termination::Unwind`], which
/// [`HarnessFactory`] selects for this host unless `fatal.policy` says
/// otherwise. Clones share the allocation tag.
#[derive(Clone, Debug)]
pub struct LibtestHost {
    tag: Arc<AtomicUsize>,
    filter: PatternFrameFilter,
}

impl LibtestHost {
    /// Creates a host that hides runtime and harness frames.
    pub fn new() -> Self {
        Self {
            tag: Arc::default(),
            filter: PatternFrameFilter::test_harness(),
        }
    }

    /// Uses `filter` to decide which backtrace frames are shown.
    pub fn with_frame_filter(mut self, filter: PatternFrameFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the tag attached to allocations from now on.
    pub fn set_tag(&self, tag: UserTag) {
        self.tag.store(tag.0, Ordering::Relaxed);
    }
}

impl Default for LibtestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost for LibtestHost {
    fn fail_current_test(&mut self, message: &str) {
        tracing::error!(message, "pointer error");
    }

    fn warn(&mut self, message: &str) {
        tracing::warn!(message, "pointer warning");
    }

    fn allocation_tag(&self) -> UserTag {
        UserTag(self.tag.load(Ordering::Relaxed))
    }

    fn keep_frame(&self, function: &str) -> bool {
        self.filter.keep(function)
    }

    fn default_termination(&self) -> Termination {
        Termination::Unwind
    }
}

/// Reports to a [`TestHost`], with an optional statistics file.
pub struct HarnessListener<H> {
    writer: LeakReportWriter,
    host: H,
    stats: Option<StatsChannel>,
    prefix: String,
    termination: Termination,
    run_completed: bool,
}

impl<H: TestHost> HarnessListener<H> {
    /// Creates a listener printing to the process's standard streams.
    pub fn new(config: &ListenerConfig, platform: Arc<dyn Platform>, host: H) -> Self {
        Self::with_streams(config, platform, host, OutputStreams::standard())
    }

    /// Creates a listener printing to the given streams.
    ///
    /// The statistics file is opened here. If it cannot be opened the
    /// listener works without it.
    pub fn with_streams(
        config: &ListenerConfig,
        platform: Arc<dyn Platform>,
        host: H,
        streams: OutputStreams,
    ) -> Self {
        tracing::debug!(
            use_stderr = config.use_stderr,
            max_leaks = config.max_leaks_to_report,
            stats_path = ?config.stats_path,
            "creating test harness listener"
        );
        Self {
            writer: LeakReportWriter::new(config, streams, platform),
            host,
            stats: config.stats_path.as_deref().and_then(StatsChannel::create),
            prefix: config.prefix().to_owned(),
            termination: config.termination,
            run_completed: false,
        }
    }

    /// Sends statistics statements to `channel` instead of a file.
    pub fn with_stats_channel(mut self, channel: StatsChannel) -> Self {
        self.stats = Some(channel);
        self
    }

    /// Tells the listener the test run is over.
    ///
    /// Warnings raised afterwards, typically while static objects are torn
    /// down, have no test to be reported against and are dropped.
    pub fn run_finished(&mut self) {
        self.run_completed = true;
    }

    /// Whether [`run_finished`](Self::run_finished) has been called.
    pub fn is_run_finished(&self) -> bool {
        self.run_completed
    }

    /// The host this listener reports to.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// How errors stop execution.
    pub fn termination(&self) -> Termination {
        self.termination
    }
}

impl<H: TestHost> Listener for HarnessListener<H> {
    fn maximum_leaks_to_report(&self) -> usize {
        self.writer.max_leaks()
    }

    fn get_allocation_user_info(&self, _allocation: &AllocationInfo<'_>) -> UserTag {
        self.host.allocation_tag()
    }

    fn begin_report(&mut self, stats: &UsageStats) {
        if let Some(channel) = &mut self.stats {
            channel.statement(format_args!("$results->setNumLeaks({});", stats.leaks));
        }
        self.writer.begin(stats);
    }

    fn should_report_leak(&self, leak: &AllocationInfo<'_>) -> bool {
        !leak.user_info.is_suppressed()
    }

    fn report_leak(&mut self, leak: &AllocationInfo<'_>) {
        let host = &self.host;
        self.writer
            .leak(leak, &|function: &str| host.keep_frame(function));
    }

    fn report_truncated(&mut self, reports_logged: usize, actual_leaks: usize) {
        self.writer.truncated(reports_logged, actual_leaks);
    }

    fn end_report(&mut self) {
        let Some(stats) = self.writer.end() else {
            return;
        };
        if let Some(channel) = &mut self.stats {
            channel.statement(format_args!(
                "$results->setMemoryAmounts({}, {});",
                stats.total_bytes_allocated, stats.maximum_bytes_in_use
            ));
            channel.statement(format_args!(
                "$results->setNumCalls({}, {}, {}, {}, {});",
                stats.calls_to_new,
                stats.calls_to_delete,
                stats.calls_to_array_new,
                stats.calls_to_array_delete,
                stats.calls_to_any_delete_null()
            ));
        }
    }

    fn error(&mut self, error: &PointerError) -> ! {
        let message = format!("{}{error}", self.prefix);
        self.host.fail_current_test(&message);
        self.termination.terminate(&message)
    }

    fn warning(&mut self, warning: &PointerWarning) {
        if self.run_completed {
            return;
        }
        let message = format!("{}{warning}", self.prefix);
        self.host.warn(&message);
    }
}

/// Builds [`HarnessListener`]s reporting to clones of one host.
pub struct HarnessFactory<H> {
    host: H,
    streams: StreamSource,
}

impl<H: TestHost + Clone> HarnessFactory<H> {
    /// A factory whose listeners print to the standard streams.
    pub fn new(host: H) -> Self {
        Self {
            host,
            streams: standard_streams(),
        }
    }

    /// A factory whose listeners print to the streams `streams` returns.
    pub fn with_streams(
        host: H,
        streams: impl Fn() -> OutputStreams + Send + Sync + 'static,
    ) -> Self {
        Self {
            host,
            streams: Box::new(streams),
        }
    }
}

impl<H: TestHost + Clone> ListenerFactory for HarnessFactory<H> {
    type Listener = HarnessListener<H>;

    fn create_listener(
        &self,
        options: &Options,
        platform: Arc<dyn Platform>,
    ) -> HarnessListener<H> {
        let mut config = ListenerConfig::from_options(options);
        let policy = options.get(FATAL_POLICY).map(str::parse::<Termination>);
        if !matches!(policy, Some(Ok(_))) {
            config.termination = self.host.default_termination();
        }
        HarnessListener::with_streams(&config, platform, self.host.clone(), (self.streams)())
    }
}
