//! Query parser for time references, video ids and colour words
//!
//! Patterns are compiled once when the parser is built. Vietnamese and
//! English phrasings are both recognised; matching runs on the lower-cased
//! query (upper-cased for video ids).

use crate::error::{Result, VidSearchError};
use regex::Regex;
use serde::Serialize;

/// Parsed value of a time reference, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TimeValue {
    Point(f64),
    Range(f64, f64),
}

/// A time reference found in a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeReference {
    pub text: String,
    pub value: TimeValue,
    /// Byte offsets into the lower-cased query
    pub start: usize,
    pub end: usize,
}

/// Window derived from all time references of a query
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeWindow {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
enum TimeUnit {
    Minutes,
    Seconds,
    Clock,
    Range,
}

#[derive(Debug, Clone)]
struct TimePattern {
    regex: Regex,
    unit: TimeUnit,
}

const COLORS_VI: &[&str] = &["đỏ", "xanh", "vàng", "đen", "trắng", "xám", "nâu", "hồng", "tím", "cam"];
const COLORS_EN: &[&str] = &[
    "red", "green", "blue", "yellow", "black", "white", "gray", "grey", "brown", "pink", "purple",
    "orange",
];

/// Pre-compiled query parser
#[derive(Debug, Clone)]
pub struct QueryParser {
    time_patterns: Vec<TimePattern>,
    video_id: Regex,
    colors: Regex,
}

impl QueryParser {
    pub fn new() -> Result<Self> {
        let specs: [(&str, TimeUnit); 7] = [
            (r"phút\s+(?:thứ\s+)?(\d+)", TimeUnit::Minutes),
            (r"\bminute\s+(\d+)", TimeUnit::Minutes),
            (r"(\d+):(\d{1,2})", TimeUnit::Clock),
            (r"giây\s+(?:thứ\s+)?(\d+)", TimeUnit::Seconds),
            (r"\bsecond\s+(\d+)", TimeUnit::Seconds),
            (r"từ\s+(\d+)\s+đến\s+(\d+)", TimeUnit::Range),
            (r"\bfrom\s+(\d+)\s+to\s+(\d+)", TimeUnit::Range),
        ];

        let time_patterns = specs
            .iter()
            .map(|(pattern, unit)| {
                compile(pattern).map(|regex| TimePattern { regex, unit: *unit })
            })
            .collect::<Result<Vec<_>>>()?;

        let palette: Vec<&str> = COLORS_VI.iter().chain(COLORS_EN.iter()).copied().collect();

        Ok(Self {
            time_patterns,
            video_id: compile(r"L\d+_V\d+")?,
            colors: compile(&format!(r"\b({})\b", palette.join("|")))?,
        })
    }

    /// All time references, grouped by pattern in declaration order
    pub fn extract_time_references(&self, query: &str) -> Vec<TimeReference> {
        let lowered = query.to_lowercase();
        let mut refs = Vec::new();

        for pattern in &self.time_patterns {
            for caps in pattern.regex.captures_iter(&lowered) {
                let Some(whole) = caps.get(0) else { continue };
                let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());

                let value = match pattern.unit {
                    TimeUnit::Minutes => number(1).map(|m| TimeValue::Point(m * 60.0)),
                    TimeUnit::Seconds => number(1).map(TimeValue::Point),
                    TimeUnit::Clock => match (number(1), number(2)) {
                        (Some(m), Some(s)) => Some(TimeValue::Point(m * 60.0 + s)),
                        _ => None,
                    },
                    TimeUnit::Range => match (number(1), number(2)) {
                        (Some(a), Some(b)) => Some(TimeValue::Range(a, b)),
                        _ => None,
                    },
                };

                if let Some(value) = value {
                    refs.push(TimeReference {
                        text: whole.as_str().to_string(),
                        value,
                        start: whole.start(),
                        end: whole.end(),
                    });
                }
            }
        }

        refs
    }

    /// Collapse the query's time references into one window
    ///
    /// An explicit range wins. Otherwise two or more points span min..max and
    /// a single point only fixes the start.
    pub fn time_window(&self, query: &str) -> TimeWindow {
        let refs = self.extract_time_references(query);

        if let Some((a, b)) = refs.iter().find_map(|r| match r.value {
            TimeValue::Range(a, b) => Some((a, b)),
            TimeValue::Point(_) => None,
        }) {
            return TimeWindow {
                start: Some(a.min(b)),
                end: Some(a.max(b)),
            };
        }

        let points: Vec<f64> = refs
            .iter()
            .filter_map(|r| match r.value {
                TimeValue::Point(p) => Some(p),
                TimeValue::Range(..) => None,
            })
            .collect();

        match points.len() {
            0 => TimeWindow::default(),
            1 => TimeWindow {
                start: Some(points[0]),
                end: None,
            },
            _ => TimeWindow {
                start: points.iter().copied().reduce(f64::min),
                end: points.iter().copied().reduce(f64::max),
            },
        }
    }

    /// Video ids such as `L01_V001`, upper-cased, in order of appearance
    pub fn extract_video_ids(&self, query: &str) -> Vec<String> {
        let upper = query.to_uppercase();
        let mut ids: Vec<String> = Vec::new();
        for m in self.video_id.find_iter(&upper) {
            if !ids.iter().any(|id| id == m.as_str()) {
                ids.push(m.as_str().to_string());
            }
        }
        ids
    }

    /// Colour words, deduplicated, in order of appearance
    pub fn extract_colors(&self, query: &str) -> Vec<String> {
        let lowered = query.to_lowercase();
        let mut colors: Vec<String> = Vec::new();
        for m in self.colors.find_iter(&lowered) {
            if !colors.iter().any(|c| c == m.as_str()) {
                colors.push(m.as_str().to_string());
            }
        }
        colors
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| VidSearchError::Config(format!("Invalid query pattern '{}': {}", pattern, e)))
}
