#![no_main]
use libfuzzer_sys::fuzz_target;
use tilesync_log::LineClassifier;

fuzz_target!(|data: &[u8]| {
    // Old timestamp so the translation layer runs too
    let mut classifier = LineClassifier::new(1_400_000_000);
    let text = String::from_utf8_lossy(data);
    for line in text.split('\n') {
        let _ = classifier.classify(line);
    }
});
