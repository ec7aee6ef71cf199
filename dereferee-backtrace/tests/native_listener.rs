use std::sync::Arc;

use dereferee::{
    Address, AllocationInfo, Listener, ListenerFactory, Options, PointerWarning, UsageStats,
    listener::plain::PlainFactory, output::OutputStreams, testing::SharedBuffer,
};
use dereferee_backtrace::NativePlatform;

fn factory(buffer: &SharedBuffer) -> PlainFactory {
    let buffer = buffer.clone();
    PlainFactory::with_streams(move || OutputStreams::new(buffer.clone(), std::io::sink()))
}

#[inline(never)]
fn warn_here(listener: &mut dyn Listener) {
    listener.warning(&PointerWarning::LeakOutOfScope);
}

#[test]
fn warning_shows_call_site() {
    let buffer = SharedBuffer::new();
    let mut listener =
        factory(&buffer).create_listener(&Options::new(), Arc::new(NativePlatform::new()));
    warn_here(&mut listener);

    let lines = buffer.lines();
    assert_eq!(
        lines[0],
        "Pointer warning: Memory leak caused by last live pointer to memory block going out of scope"
    );
    assert!(lines[1].starts_with("    warning in: "), "{lines:#?}");
    assert!(lines.iter().any(|line| line.contains("warn_here")), "{lines:#?}");
    assert!(
        !lines.iter().any(|line| line.contains(" dereferee::")),
        "{lines:#?}"
    );
    assert_eq!(lines.last().map(String::as_str), Some(""));
}

#[test]
fn leak_backtrace_is_resolved() {
    let platform = NativePlatform::new();
    let trace = dereferee::backtrace::Platform::capture_backtrace(&platform).unwrap();
    let buffer = SharedBuffer::new();
    let mut listener = factory(&buffer).create_listener(
        &Options::from_pairs([("output.prefix", "~ ")]),
        Arc::new(platform),
    );

    listener.begin_report(&UsageStats {
        leaks: 1,
        ..UsageStats::default()
    });
    listener.report_leak(
        &AllocationInfo::new(Address(0x1000), 4)
            .with_type_name("int")
            .with_backtrace(&trace),
    );

    let lines = buffer.lines();
    assert_eq!(lines[0], "~ 1 memory leaks were detected:");
    assert_eq!(lines[2], "~ Leaked 4 bytes (int) at address 0x1000");
    assert!(lines[3].starts_with("~   allocated in: "), "{lines:#?}");
    assert!(lines.iter().all(|line| line.starts_with("~ ")));
}
