#![no_main]
use libfuzzer_sys::fuzz_target;
use tilesync_log::{ClassifiedEvent, EventStream};

fuzz_target!(|data: &[u8]| {
    let lines: Vec<_> = EventStream::new(data, 1_500_000_000).collect();
    // Every stream closes its last frame
    assert_eq!(
        lines.last().and_then(|line| line.event.clone()),
        Some(ClassifiedEvent::BlankLine)
    );
});
