//! Extraction of structured values from gdb console text
//!
//! Each parser either matches its expected pattern or fails with
//! [`Error::ConsoleOutput`]; nothing falls back to a default silently.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::{Error, Result};
use crate::dbgp::types::Property;

static VARIABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S.*?) = (.*)$").expect("must compile"));
static CURRENT_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Current source file is (.+)").expect("must compile"));
static LOCATED_IN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Located in (.+)").expect("must compile"));
static COMPILATION_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Compilation directory is (.+)").expect("must compile"));
static LANGUAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)Source language is (\S+?)\.?\s*$").expect("must compile"));
static FRAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(\d+)\s+(?:0x[0-9a-fA-F]+ in )?(.+?) \(.*\) at (.+):(\d+)\s*$")
        .expect("must compile")
});
static BREAKPOINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Breakpoint (\d+)\b").expect("must compile"));
static VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\d+ = (.*)$").expect("must compile"));

/// Replies of `info locals` / `info args` that mean "nothing here"
const EMPTY_SCOPE_REPLIES: &[&str] = &[
    "No locals.",
    "No arguments.",
    "No symbol table info available.",
];

/// Location reported by `info source`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Absolute path when gdb knows it, otherwise as compiled
    pub path: String,
    pub language: String,
    pub compilation_dir: Option<String>,
}

impl SourceInfo {
    /// Resolve a path reported by gdb against the compilation directory
    pub fn resolve(&self, file: &str) -> String {
        match &self.compilation_dir {
            Some(dir) if !file.starts_with('/') => {
                format!("{}/{}", dir.trim_end_matches('/'), file)
            }
            _ => file.to_string(),
        }
    }
}

/// One frame of `backtrace` output that has a source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceFrame {
    pub level: u32,
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// Parse one `NAME = VALUE [EXTRA]` line of `info locals` / `info args`
///
/// Returns `Ok(None)` for the "nothing to show" replies.
pub fn parse_variable(line: &str) -> Result<Option<Property>> {
    let line = line.trim_end();
    if EMPTY_SCOPE_REPLIES.contains(&line.trim()) {
        return Ok(None);
    }

    let caps = VARIABLE_RE
        .captures(line)
        .ok_or_else(|| Error::console_output("info locals", &[line]))?;
    let name = caps[1].to_string();
    let value = caps[2].trim().to_string();

    let composite = value.starts_with('{');
    let address = if composite {
        None
    } else {
        value.split_whitespace().next().map(String::from)
    };

    Ok(Some(Property {
        full_name: name.clone(),
        name,
        address,
        children: composite,
        value: Some(value),
        ..Default::default()
    }))
}

/// Type name from the first line of `ptype` output
pub fn parse_type(lines: &[String]) -> String {
    let Some(first) = lines.first() else {
        return "unknown".to_string();
    };
    let ty = first.trim();
    let ty = ty.strip_prefix("type = ").unwrap_or(ty);
    let ty = ty.strip_prefix("struct ").unwrap_or(ty);
    let ty = ty.strip_suffix(" {").unwrap_or(ty);
    ty.to_string()
}

/// Current file and language from `info source`
pub fn parse_source_info(lines: &[String]) -> Result<SourceInfo> {
    let text = lines.join("\n");
    let mismatch = || Error::console_output("info source", lines);

    let current = capture(&CURRENT_FILE_RE, &text).ok_or_else(mismatch)?;
    let language = capture(&LANGUAGE_RE, &text).ok_or_else(mismatch)?;

    let mut info = SourceInfo {
        path: current,
        language,
        compilation_dir: capture(&COMPILATION_DIR_RE, &text),
    };
    info.path = match capture(&LOCATED_IN_RE, &text) {
        Some(located) => located,
        None => info.resolve(&info.path),
    };

    Ok(info)
}

/// Frames with a source location from `backtrace` output
pub fn parse_backtrace(lines: &[String]) -> Vec<BacktraceFrame> {
    lines
        .iter()
        .filter_map(|line| FRAME_RE.captures(line.trim_end()))
        .filter_map(|caps| {
            Some(BacktraceFrame {
                level: caps[1].parse().ok()?,
                function: caps[2].to_string(),
                file: caps[3].to_string(),
                line: caps[4].parse().ok()?,
            })
        })
        .collect()
}

/// Breakpoint number from the reply to `break`
pub fn parse_breakpoint_id(lines: &[&str]) -> Result<u32> {
    let text = lines.join("\n");
    capture(&BREAKPOINT_RE, &text)
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| Error::console_output("break", lines))
}

/// Value from the reply to `print`
pub fn parse_value(line: &str) -> Result<String> {
    capture(&VALUE_RE, line.trim_end()).ok_or_else(|| Error::console_output("print", &[line]))
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end().to_string())
}
