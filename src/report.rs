//! The engine's side of the end-of-run leak report.

use crate::{
    listener::Listener,
    model::{AllocationInfo, UsageStats},
};

/// What [`drive_leak_report`] did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LeakSummary {
    /// Leaks passed to [`Listener::report_leak`].
    pub shown: usize,
    /// Leaks the listener agreed to report.
    pub total: usize,
}

impl LeakSummary {
    /// Whether some reportable leaks were not shown individually.
    pub const fn is_truncated(&self) -> bool {
        self.shown < self.total
    }
}

/// Walks `leaks` through `listener` the way the checked pointer engine does
/// at shutdown.
///
/// `stats` goes to [`begin_report`](Listener::begin_report) unchanged. Leaks
/// rejected by [`should_report_leak`](Listener::should_report_leak) are not
/// counted. The first [`maximum_leaks_to_report`] of the rest are reported
/// individually, and if any are left over
/// [`report_truncated`](Listener::report_truncated) is called once before
/// [`end_report`](Listener::end_report).
///
/// [`maximum_leaks_to_report`]: Listener::maximum_leaks_to_report
pub fn drive_leak_report<'a, L, I>(listener: &mut L, stats: &UsageStats, leaks: I) -> LeakSummary
where
    L: Listener + ?Sized,
    I: IntoIterator<Item = AllocationInfo<'a>>,
{
    let cap = listener.maximum_leaks_to_report();
    let mut summary = LeakSummary::default();

    listener.begin_report(stats);
    for leak in leaks {
        if !listener.should_report_leak(&leak) {
            continue;
        }
        summary.total += 1;
        if summary.shown < cap {
            listener.report_leak(&leak);
            summary.shown += 1;
        }
    }
    if summary.is_truncated() {
        listener.report_truncated(summary.shown, summary.total);
    }
    listener.end_report();

    summary
}
