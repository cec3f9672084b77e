use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use thiserror::Error;

use httpscope_types::{Record, normalize_uri};

/// Turns one raw access-log line into a [`Record`]
///
/// `None` means the line does not match the format; callers drop it.
pub trait LogParser: Send {
    fn parse(&self, line: &str) -> Option<Record>;
}

impl<P: LogParser + ?Sized> LogParser for Box<P> {
    fn parse(&self, line: &str) -> Option<Record> {
        (**self).parse(line)
    }
}

/// Errors raised while building a parser
#[derive(Error, Debug)]
pub enum ParseSetupError {
    #[error("unable to determine log format: no #Fields directive in {0}")]
    MissingFields(String),

    #[error("W3C #Fields directive lacks required field '{0}'")]
    MissingField(&'static str),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Supported log formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Common/combined log format
    #[default]
    Clf,
    /// W3C extended log format
    W3c,
}

impl LogFormat {
    /// Build the parser for a log file of this format
    pub fn parser_for(&self, path: &Path) -> Result<Box<dyn LogParser>, ParseSetupError> {
        match self {
            Self::Clf => Ok(Box::new(ClfParser::new()?)),
            Self::W3c => Ok(Box::new(W3cParser::from_path(path)?)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clf => "clf",
            Self::W3c => "w3c",
        }
    }
}

// ============================================================================
// Common log format
// ============================================================================

const CLF_PATTERN: &str = concat!(
    r#"^(?P<host>\S+)\s+\S+\s+(?P<user>\S+)\s+\[(?P<datetime>[^\]]+)\]\s+"#,
    r#""(?P<method>\S+)\s+(?P<uri>\S+)\s+HTTP/[^"]+"\s+"#,
    r#"(?P<status>[0-9]+)\s+(?P<size>\S+)"#,
    r#"(?:\s+"(?P<referer>[^"]*)"\s+"[^"]*")?\s*\z"#,
);

const CLF_DATE_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";
const CLF_NAIVE_DATE_FORMAT: &str = "%d/%b/%Y:%H:%M:%S";

/// Parser for the common and combined log formats
///
/// ```text
/// 127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326 "http://www.example.com/start.html" "Mozilla/4.08"
/// ```
pub struct ClfParser {
    regex: Regex,
}

impl ClfParser {
    pub fn new() -> Result<Self, ParseSetupError> {
        Ok(Self {
            regex: Regex::new(CLF_PATTERN)?,
        })
    }

    fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_str(raw, CLF_DATE_FORMAT) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, CLF_NAIVE_DATE_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

impl LogParser for ClfParser {
    fn parse(&self, line: &str) -> Option<Record> {
        let caps = self.regex.captures(line.trim())?;

        let timestamp = Self::parse_timestamp(&caps["datetime"])?;
        let status = caps["status"].parse().ok()?;

        Some(Record {
            uri: normalize_uri(&caps["uri"]),
            timestamp,
            size: parse_size(&caps["size"]),
            status,
            method: caps["method"].to_string(),
            referer: caps.name("referer").and_then(|m| dash_to_none(m.as_str())),
            user: dash_to_none(&caps["user"]),
        })
    }
}

// ============================================================================
// W3C extended log format
// ============================================================================

const W3C_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parser for W3C extended logs, driven by the file's `#Fields:` directive
///
/// ```text
/// #Fields: date time cs-method cs-uri-stem sc-status sc-bytes cs(Referer) cs-username
/// 2024-01-15 10:30:00 GET /index.html 200 512 - -
/// ```
#[derive(Debug)]
pub struct W3cParser {
    /// Normalized field name to column index
    columns: HashMap<String, usize>,
    width: usize,
}

impl W3cParser {
    /// Read the `#Fields:` directive from the log file at `path`
    pub fn from_path(path: &Path) -> Result<Self, ParseSetupError> {
        let io_err = |source| ParseSetupError::Io {
            path: path.display().to_string(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(io_err)?);

        for line in reader.lines() {
            let line = line.map_err(io_err)?;
            if let Some(fields) = line.strip_prefix("#Fields:") {
                return Self::from_fields(fields);
            }
        }

        Err(ParseSetupError::MissingFields(path.display().to_string()))
    }

    /// Build from the text following `#Fields:`
    pub fn from_fields(fields: &str) -> Result<Self, ParseSetupError> {
        let columns: HashMap<String, usize> = fields
            .split_whitespace()
            .enumerate()
            .map(|(i, name)| (normalize_field(name), i))
            .collect();
        let width = fields.split_whitespace().count();

        for required in ["date", "time", "cs_method", "sc_status"] {
            if !columns.contains_key(required) {
                return Err(ParseSetupError::MissingField(required));
            }
        }
        if !columns.contains_key("cs_uri_stem") && !columns.contains_key("cs_uri") {
            return Err(ParseSetupError::MissingField("cs-uri-stem"));
        }

        Ok(Self { columns, width })
    }

    fn field<'a>(&self, values: &[&'a str], names: &[&str]) -> Option<&'a str> {
        names
            .iter()
            .find_map(|name| self.columns.get(*name))
            .and_then(|i| values.get(*i).copied())
    }
}

impl LogParser for W3cParser {
    fn parse(&self, line: &str) -> Option<Record> {
        if line.starts_with('#') {
            return None;
        }
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() != self.width {
            return None;
        }

        let date = self.field(&values, &["date"])?;
        let time = self.field(&values, &["time"])?;
        let timestamp =
            NaiveDateTime::parse_from_str(&format!("{} {}", date, time), W3C_DATE_FORMAT)
                .ok()?
                .and_utc();

        let uri = self.field(&values, &["cs_uri_stem", "cs_uri"])?;
        let status = self.field(&values, &["sc_status"])?.parse().ok()?;

        Some(Record {
            uri: normalize_uri(uri),
            timestamp,
            size: self
                .field(&values, &["sc_bytes", "size"])
                .map(parse_size)
                .unwrap_or(0),
            status,
            method: self.field(&values, &["cs_method"])?.to_string(),
            referer: self
                .field(&values, &["cs_referer_", "sc_referer", "cs_referer"])
                .and_then(dash_to_none),
            user: self.field(&values, &["cs_username"]).and_then(dash_to_none),
        })
    }
}

/// `cs(Referer)` -> `cs_referer_`, `cs-uri-stem` -> `cs_uri_stem`
fn normalize_field(name: &str) -> String {
    name.to_lowercase().replace(['(', ')', '-'], "_")
}

fn parse_size(raw: &str) -> u64 {
    raw.parse().unwrap_or(0)
}

fn dash_to_none(raw: &str) -> Option<String> {
    if raw == "-" || raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
