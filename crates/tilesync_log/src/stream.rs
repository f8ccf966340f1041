//! Lazy stream of classified lines over a reader.

use crate::classify::{Classification, LineClassifier};
use crate::event::{ClassifiedEvent, ClassifiedLine};
use std::io::BufRead;
use tilesync_core::LogTimestamp;

/// Iterator of classified lines read from a log.
///
/// Lines are read on demand. The stream always ends with a blank line so the
/// last frame of the file is closed; one is synthesized when the file does not
/// end with a blank line of its own or when reading stopped early.
pub struct EventStream<R> {
    reader: R,
    classifier: LineClassifier,
    line_number: usize,
    last_was_blank: bool,
    finished: bool,
    buffer: Vec<u8>,
}

impl<R: BufRead> EventStream<R> {
    /// Stream over a log written at `log_timestamp`
    pub fn new(reader: R, log_timestamp: LogTimestamp) -> Self {
        Self::with_classifier(reader, LineClassifier::new(log_timestamp))
    }

    /// Stream with an explicit classifier
    pub fn with_classifier(reader: R, classifier: LineClassifier) -> Self {
        Self {
            reader,
            classifier,
            line_number: 0,
            last_was_blank: false,
            finished: false,
            buffer: Vec::new(),
        }
    }

    /// Number of lines consumed so far
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Mark the stream finished and produce the closing blank line if needed
    fn finish(&mut self, force_blank: bool) -> Option<ClassifiedLine> {
        self.finished = true;
        if self.last_was_blank && !force_blank {
            return None;
        }
        Some(ClassifiedLine {
            line_number: self.line_number + 1,
            raw: String::new(),
            event: Some(ClassifiedEvent::BlankLine),
        })
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = ClassifiedLine;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        self.buffer.clear();
        let read = match self.reader.read_until(b'\n', &mut self.buffer) {
            Ok(read) => read,
            Err(err) => {
                tracing::warn!(line = self.line_number + 1, error = %err, "log read failed");
                return self.finish(false);
            }
        };

        if read == 0 {
            return self.finish(false);
        }

        self.line_number += 1;

        if self.buffer.last() != Some(&b'\n') {
            tracing::debug!(line = self.line_number, "dropping unterminated final line");
            return self.finish(false);
        }
        self.buffer.pop();

        let raw = String::from_utf8_lossy(&self.buffer).into_owned();
        let event = match self.classifier.classify(&raw) {
            Classification::Event(event) => Some(event),
            Classification::Unrecognized => None,
            Classification::Stop => {
                tracing::debug!(line = self.line_number, "second connection_made, stopping");
                return self.finish(true);
            }
        };

        self.last_was_blank = matches!(event, Some(ClassifiedEvent::BlankLine));
        Some(ClassifiedLine {
            line_number: self.line_number,
            raw,
            event,
        })
    }
}
