//! Parser for ffmpeg's `-progress` output.
//!
//! ffmpeg writes one `key=value` pair per line. Lines that do not split into
//! exactly a key and a value produce no event.

use std::collections::HashMap;

/// A typed event from the progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// `out_time_us` with a real value.
    OutTime { micros: u64 },
    /// `speed`, e.g. "1.5x".
    Speed(String),
    /// `progress=continue`.
    Continue,
    /// `progress=end`.
    End,
    /// Any other field, including placeholder `out_time_us` values.
    Field { key: String, value: String },
}

impl ProgressEvent {
    /// Parses one line. Returns `None` for anything that is not `key=value`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let mut parts = line.split('=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if parts.next().is_some() || key.is_empty() {
            return None;
        }

        let event = match key {
            "out_time_us" => match parse_micros(value) {
                Some(micros) => Self::OutTime { micros },
                None => Self::field(key, value),
            },
            "speed" if value != "N/A" => Self::Speed(value.to_string()),
            "progress" if value == "end" => Self::End,
            "progress" if value == "continue" => Self::Continue,
            _ => Self::field(key, value),
        };
        Some(event)
    }

    fn field(key: &str, value: &str) -> Self {
        Self::Field {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Parses a microsecond count; `N/A` and negative values are placeholders.
fn parse_micros(value: &str) -> Option<u64> {
    value.parse::<i64>().ok().and_then(|v| u64::try_from(v).ok())
}

/// Per-task accumulator for progress fields.
#[derive(Debug, Default)]
pub struct ProgressState {
    fields: HashMap<String, String>,
    position_secs: u64,
    speed: Option<String>,
    finished: bool,
}

impl ProgressState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw line. Returns the advance in whole seconds when the
    /// displayed position moved forward.
    pub fn feed_line(&mut self, line: &str) -> Option<u64> {
        ProgressEvent::parse(line).and_then(|event| self.apply(event))
    }

    /// Applies one event. Returns the advance in whole seconds when the
    /// displayed position moved forward.
    pub fn apply(&mut self, event: ProgressEvent) -> Option<u64> {
        match event {
            ProgressEvent::OutTime { micros } => {
                self.fields
                    .insert("out_time_us".to_string(), micros.to_string());
                let secs = (micros as f64 / 1_000_000.0).round() as u64;
                if secs > self.position_secs {
                    let delta = secs - self.position_secs;
                    self.position_secs = secs;
                    return Some(delta);
                }
                None
            }
            ProgressEvent::Speed(speed) => {
                self.fields.insert("speed".to_string(), speed.clone());
                self.speed = Some(speed);
                None
            }
            ProgressEvent::Continue => None,
            ProgressEvent::End => {
                self.finished = true;
                None
            }
            ProgressEvent::Field { key, value } => {
                self.fields.insert(key, value);
                None
            }
        }
    }

    /// Seconds of output written so far.
    pub fn position_secs(&self) -> u64 {
        self.position_secs
    }

    /// Last reported speed.
    pub fn speed(&self) -> Option<&str> {
        self.speed.as_deref()
    }

    /// Latest raw value of a field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Whether `progress=end` was seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
