//! In-memory collaborators for exercising listeners.
//!
//! Everything here stands in for a piece of the outside world: a byte sink
//! that can be read back ([`SharedBuffer`]), a platform with a fixed symbol
//! table ([`ScriptedPlatform`]), a test framework that remembers what it was
//! told ([`RecordingHost`]), and a listener that records the calls it
//! receives instead of printing them ([`EventLog`]).

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    backtrace::{FrameFilter, FrameInfo, PatternFrameFilter, Platform},
    listener::{Listener, harness::TestHost},
    messages::{PointerError, PointerWarning},
    model::{Address, AllocationInfo, UsageStats, UserTag},
    termination::Termination,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A cloneable `Write` sink whose contents can be inspected.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.bytes)).into_owned()
    }

    /// Everything written so far, split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    /// Discards everything written so far.
    pub fn clear(&self) {
        lock(&self.bytes).clear();
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.bytes).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A [`Platform`] backed by a fixed address table.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPlatform {
    frames: HashMap<Address, FrameInfo>,
    current: Option<Vec<Address>>,
}

impl ScriptedPlatform {
    /// A platform that resolves nothing and cannot capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `address` resolve to `frame`.
    pub fn with_frame(mut self, address: usize, frame: FrameInfo) -> Self {
        self.frames.insert(Address(address), frame);
        self
    }

    /// Sets the backtrace returned for the current call site.
    pub fn with_current_backtrace(mut self, addresses: impl IntoIterator<Item = usize>) -> Self {
        self.current = Some(addresses.into_iter().map(Address).collect());
        self
    }
}

impl Platform for ScriptedPlatform {
    fn frame_info(&self, address: Address) -> Option<FrameInfo> {
        self.frames.get(&address).cloned()
    }

    fn capture_backtrace(&self) -> Option<Vec<Address>> {
        self.current.clone()
    }
}

#[derive(Debug, Default)]
struct HostState {
    failures: Vec<String>,
    warnings: Vec<String>,
    tag: UserTag,
}

/// A [`TestHost`] that records failures and warnings.
///
/// Clones share their state, so a test can keep one handle while a listener
/// owns another.
#[derive(Clone, Debug)]
pub struct RecordingHost {
    state: Arc<Mutex<HostState>>,
    filter: PatternFrameFilter,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            filter: PatternFrameFilter::test_harness(),
        }
    }
}

impl RecordingHost {
    /// Creates a host with no recorded events and a zero tag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tag handed out for new allocations.
    pub fn set_tag(&self, tag: UserTag) {
        lock(&self.state).tag = tag;
    }

    /// Failure messages recorded so far.
    pub fn failures(&self) -> Vec<String> {
        lock(&self.state).failures.clone()
    }

    /// Warning messages recorded so far.
    pub fn warnings(&self) -> Vec<String> {
        lock(&self.state).warnings.clone()
    }
}

impl TestHost for RecordingHost {
    fn fail_current_test(&mut self, message: &str) {
        lock(&self.state).failures.push(message.to_owned());
    }

    fn warn(&mut self, message: &str) {
        lock(&self.state).warnings.push(message.to_owned());
    }

    fn allocation_tag(&self) -> UserTag {
        lock(&self.state).tag
    }

    fn keep_frame(&self, function: &str) -> bool {
        self.filter.keep(function)
    }
}

/// A call received by an [`EventLog`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// `begin_report` with its statistics.
    BeginReport(UsageStats),
    /// `report_leak` for the allocation at this address.
    ReportLeak(Address),
    /// `report_truncated`.
    ReportTruncated {
        /// Leaks reported individually.
        shown: usize,
        /// Leaks found.
        total: usize,
    },
    /// `end_report`.
    EndReport,
    /// `error` with the rendered message.
    Error(String),
    /// `warning` with the rendered message.
    Warning(String),
}

/// A listener that records every call instead of printing it.
///
/// Errors are recorded and then unwind with a
/// [`PointerFault`](crate::termination::PointerFault).
#[derive(Clone, Debug)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
    max_leaks: usize,
}

impl EventLog {
    /// Creates a log reporting at most `max_leaks` leaks individually.
    pub fn new(max_leaks: usize) -> Self {
        Self {
            events: Arc::default(),
            max_leaks,
        }
    }

    /// The calls received so far, in order.
    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    fn push(&self, event: Event) {
        lock(&self.events).push(event);
    }
}

impl Listener for EventLog {
    fn maximum_leaks_to_report(&self) -> usize {
        self.max_leaks
    }

    fn begin_report(&mut self, stats: &UsageStats) {
        self.push(Event::BeginReport(*stats));
    }

    fn should_report_leak(&self, leak: &AllocationInfo<'_>) -> bool {
        !leak.user_info.is_suppressed()
    }

    fn report_leak(&mut self, leak: &AllocationInfo<'_>) {
        self.push(Event::ReportLeak(leak.address));
    }

    fn report_truncated(&mut self, reports_logged: usize, actual_leaks: usize) {
        self.push(Event::ReportTruncated {
            shown: reports_logged,
            total: actual_leaks,
        });
    }

    fn end_report(&mut self) {
        self.push(Event::EndReport);
    }

    fn error(&mut self, error: &PointerError) -> ! {
        let message = error.to_string();
        self.push(Event::Error(message.clone()));
        Termination::Unwind.terminate(&message)
    }

    fn warning(&mut self, warning: &PointerWarning) {
        self.push(Event::Warning(warning.to_string()));
    }
}
