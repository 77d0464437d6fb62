//! Parsing of load-generator responses.
//!
//! The `/log` endpoint returns an INI-like document:
//!
//! ```text
//! [Test]
//! type=horizontal
//! startTime=2024-03-01T12:00:00.000+00:00
//!
//! [Current rps=10.0]
//! ...
//! [Current rps=25.5]
//! [Test finished]
//! ```
//!
//! Section headers carry the throughput samples; the last one in document
//! order is the current value.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::{LoadGenError, LoadGenResult};

const TEST_ID_PATTERN: &str = r"name=(.*log)";
const RPS_MARKER: &str = "Current rps=";
const FINISHED_MARKER: &str = "[Test finished]";
const TEST_SECTION: &str = "Test";
const START_TIME_KEY: &str = "starttime";

/// Extract the test id (log name) from a test-initialization response.
pub fn extract_test_id(body: &str) -> LoadGenResult<String> {
    let re = Regex::new(TEST_ID_PATTERN).map_err(|e| LoadGenError::Protocol(e.to_string()))?;
    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| LoadGenError::Protocol(format!("no test id in response: {body:?}")))
}

#[derive(Debug, Clone, PartialEq)]
struct Section {
    name: String,
    /// Keys are lower-cased.
    entries: Vec<(String, String)>,
}

/// A parsed `/log` body.
#[derive(Debug, Clone, PartialEq)]
pub struct LogDocument {
    sections: Vec<Section>,
    finished: bool,
}

impl LogDocument {
    pub fn parse(body: &str) -> Self {
        let mut sections: Vec<Section> = Vec::new();

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push(Section {
                    name: name.trim().to_string(),
                    entries: Vec::new(),
                });
                continue;
            }
            // Entries before the first header have nowhere to go.
            if let Some(section) = sections.last_mut()
                && let Some((key, value)) = line.split_once(['=', ':'])
            {
                section
                    .entries
                    .push((key.trim().to_lowercase(), value.trim().to_string()));
            }
        }

        Self {
            sections,
            finished: body.contains(FINISHED_MARKER),
        }
    }

    /// Whether the completion marker appears anywhere in the body.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The most recent throughput sample, if any.
    pub fn current_rps(&self) -> LoadGenResult<Option<f64>> {
        let Some(section) = self.sections.iter().rev().find(|s| s.name.contains(RPS_MARKER))
        else {
            return Ok(None);
        };
        let (_, raw) = section
            .name
            .split_once(RPS_MARKER)
            .unwrap_or((section.name.as_str(), ""));
        raw.trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| LoadGenError::Protocol(format!("malformed throughput sample [{}]", section.name)))
    }

    /// Start time from the `[Test]` section.
    ///
    /// Key lookup ignores case; a present but unparsable value is a
    /// protocol error.
    pub fn start_time(&self) -> LoadGenResult<Option<DateTime<Utc>>> {
        let value = self
            .sections
            .iter()
            .filter(|s| s.name == TEST_SECTION)
            .flat_map(|s| s.entries.iter())
            .find(|(key, _)| key == START_TIME_KEY)
            .map(|(_, value)| value.as_str());

        match value {
            None | Some("") => Ok(None),
            Some(raw) => parse_timestamp(raw)
                .map(Some)
                .ok_or_else(|| LoadGenError::Protocol(format!("unrecognized startTime {raw:?}"))),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    // No offset: the load generator reports UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts.and_utc());
        }
    }
    None
}
