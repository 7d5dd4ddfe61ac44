// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal trace-log boundary contract (`SPEC_FULL.md` §10.5).
//!
//! This is a boundary service, not a feature the engine implements in depth:
//! full persistence, rotation policy, and querying are out of scope. What's
//! here is the trait the engine dispatch/timer/state-machine code logs
//! through, a no-op default, and one concrete writer for the XML shape named
//! in §6, enough to satisfy the save/round-trip testable property in §8.

use std::io::Write as _;

use parking_lot::Mutex;

/// Up to three key/value pairs, per the bound named in §6.
#[derive(Debug, Clone, Default)]
pub struct SmallFields(Vec<(&'static str, String)>);

impl SmallFields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(mut self, key: &'static str, value: impl Into<String>) -> Self {
        debug_assert!(self.0.len() < 3, "trace entries carry at most 3 key/value pairs");
        if self.0.len() < 3 {
            self.0.push((key, value.into()));
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, String)> {
        self.0.iter()
    }
}

/// One trace entry: a timestamp, a type tag, and up to three fields.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub timestamp_ms: u64,
    pub tag: &'static str,
    pub fields: SmallFields,
}

impl TraceEntry {
    pub fn new(timestamp_ms: u64, tag: &'static str, fields: SmallFields) -> Self {
        Self {
            timestamp_ms,
            tag,
            fields,
        }
    }
}

/// Boundary trait the engine logs through. A host wires in a concrete sink;
/// the engine itself only ever depends on this trait.
pub trait TraceSink: Send + Sync {
    fn record(&self, entry: TraceEntry);

    fn enabled(&self) -> bool {
        true
    }
}

/// Default sink: does nothing, costs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn record(&self, _entry: TraceEntry) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// In-memory ring buffer with a configurable retention cap, plus an XML writer
/// for the `<TraceLog><Trace>...</Trace></TraceLog>` shape in §6.
pub struct XmlTraceSink {
    entries: Mutex<std::collections::VecDeque<TraceEntry>>,
    capacity: usize,
}

impl XmlTraceSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(std::collections::VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the retained entries as XML to `path`, per the §6 persisted shape.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        let xml = self.to_xml_string();
        let mut file = std::fs::File::create(path)?;
        file.write_all(xml.as_bytes())
    }

    /// Builds the `<TraceLog>` document. Every `write_event` call is on an
    /// in-memory `Vec<u8>`, which cannot produce I/O errors, but the writer
    /// signature still returns `quick_xml::Error` (malformed tag names etc.),
    /// so those are propagated with `?` rather than assumed away.
    fn write_xml(&self) -> Result<Vec<u8>, quick_xml::Error> {
        use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event as XmlEvent};
        use quick_xml::writer::Writer;

        let mut buffer = Vec::new();
        let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);
        writer.write_event(XmlEvent::Start(BytesStart::new("TraceLog")))?;

        for entry in self.entries.lock().iter() {
            writer.write_event(XmlEvent::Start(BytesStart::new("Trace")))?;

            writer.write_event(XmlEvent::Start(BytesStart::new("Time")))?;
            writer.write_event(XmlEvent::Text(BytesText::new(&entry.timestamp_ms.to_string())))?;
            writer.write_event(XmlEvent::End(BytesEnd::new("Time")))?;

            writer.write_event(XmlEvent::Start(BytesStart::new(entry.tag)))?;
            for (key, value) in entry.fields.iter() {
                writer.write_event(XmlEvent::Start(BytesStart::new(*key)))?;
                writer.write_event(XmlEvent::Text(BytesText::new(value)))?;
                writer.write_event(XmlEvent::End(BytesEnd::new(*key)))?;
            }
            writer.write_event(XmlEvent::End(BytesEnd::new(entry.tag)))?;

            writer.write_event(XmlEvent::End(BytesEnd::new("Trace")))?;
        }

        writer.write_event(XmlEvent::End(BytesEnd::new("TraceLog")))?;
        Ok(buffer)
    }

    // quick-xml only ever writes valid UTF-8 text/tag bytes from the &str
    // inputs above, so the buffer is valid UTF-8 by construction.
    #[allow(clippy::expect_used)]
    pub fn to_xml_string(&self) -> String {
        let buffer = self.write_xml().unwrap_or_default();
        String::from_utf8(buffer).expect("quick_xml only writes valid UTF-8")
    }
}

impl TraceSink for XmlTraceSink {
    fn record(&self, entry: TraceEntry) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

#[cfg(test)]
#[path = "trace_tests.rs"]
mod tests;
