//! Inbound command parsing
//!
//! A command line looks like `breakpoint_set -i 7 -t line -f file:///a.c -n 10`.
//! Flags are single letters followed by one value; `--` ends the flag list.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::common::{Error, Result};

/// Flags understood by at least one command
const KNOWN_FLAGS: &[char] = &['i', 'd', 'f', 'c', 'n', 't', 'b', 'e', 's', 'v', 'r'];

/// A parsed IDE command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub transaction_id: i64,
    flags: BTreeMap<char, String>,
}

impl Command {
    /// Parse a raw command line
    ///
    /// Unknown flags are skipped along with their value.
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split(' ').filter(|t| !t.is_empty());

        let name = tokens
            .next()
            .ok_or_else(|| Error::Parse("empty command".to_string()))?
            .to_string();

        let mut flags = BTreeMap::new();
        while let Some(token) = tokens.next() {
            if token == "--" {
                break;
            }
            let flag = flag_letter(token)
                .ok_or_else(|| Error::Parse(format!("unexpected token '{}'", token)))?;
            let value = tokens
                .next()
                .ok_or_else(|| Error::Parse(format!("flag -{} requires a value", flag)))?;
            if KNOWN_FLAGS.contains(&flag) {
                flags.insert(flag, value.to_string());
            }
        }

        let transaction_id = match flags.get(&'i') {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Parse(format!("invalid transaction id '{}'", raw)))?,
            None => 0,
        };

        Ok(Self {
            name,
            transaction_id,
            flags,
        })
    }

    /// Raw string value of a flag
    pub fn str_flag(&self, flag: char) -> Option<&str> {
        self.flags.get(&flag).map(String::as_str)
    }

    /// Numeric value of a flag, `None` when absent
    pub fn int_flag<T>(&self, flag: char) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.str_flag(flag)
            .map(|raw| raw.parse().map_err(|e| Error::invalid_flag(flag, raw, e)))
            .transpose()
    }

    /// Stack depth (`-d`), defaulting to the innermost frame
    pub fn depth(&self) -> Result<u32> {
        Ok(self.int_flag('d')?.unwrap_or(0))
    }

    /// Context id (`-c`), defaulting to the first context
    pub fn context_id(&self) -> Result<u32> {
        Ok(self.int_flag('c')?.unwrap_or(0))
    }
}

/// Best-effort name and transaction id for a line that failed to parse
pub fn salvage(line: &str) -> (String, i64) {
    let mut tokens = line.split(' ').filter(|t| !t.is_empty());
    let name = tokens.next().unwrap_or("unknown").to_string();
    let mut txn = 0;
    while let Some(token) = tokens.next() {
        if token == "-i" {
            txn = tokens.next().and_then(|v| v.parse().ok()).unwrap_or(0);
            break;
        }
    }
    (name, txn)
}

fn flag_letter(token: &str) -> Option<char> {
    let mut chars = token.strip_prefix('-')?.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Some(c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_breakpoint_set() {
        let cmd = Command::parse("breakpoint_set -i 7 -t line -f file:///tmp/a.c -n 10").unwrap();
        assert_eq!(cmd.name, "breakpoint_set");
        assert_eq!(cmd.transaction_id, 7);
        assert_eq!(cmd.str_flag('t'), Some("line"));
        assert_eq!(cmd.str_flag('f'), Some("file:///tmp/a.c"));
        assert_eq!(cmd.int_flag::<u32>('n').unwrap(), Some(10));
    }

    #[test]
    fn test_missing_transaction_id_defaults_to_zero() {
        let cmd = Command::parse("status").unwrap();
        assert_eq!(cmd.transaction_id, 0);
        assert_eq!(cmd.depth().unwrap(), 0);
    }

    #[test]
    fn test_unknown_flags_are_ignored() {
        let cmd = Command::parse("stack_get -i 3 -z whatever -d 1").unwrap();
        assert_eq!(cmd.str_flag('z'), None);
        assert_eq!(cmd.depth().unwrap(), 1);
    }

    #[test]
    fn test_data_after_separator_is_not_parsed() {
        let cmd = Command::parse("eval -i 4 -- eCA9PSAx").unwrap();
        assert_eq!(cmd.transaction_id, 4);
    }

    #[test]
    fn test_malformed_commands() {
        assert!(matches!(Command::parse(""), Err(Error::Parse(_))));
        assert!(matches!(Command::parse("status -i"), Err(Error::Parse(_))));
        assert!(matches!(Command::parse("status -i one"), Err(Error::Parse(_))));
        assert!(matches!(Command::parse("status stray"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_non_numeric_flag_value() {
        let cmd = Command::parse("breakpoint_set -i 1 -t line -n ten").unwrap();
        let err = cmd.int_flag::<u32>('n').unwrap_err();
        assert!(matches!(err, Error::InvalidFlag { flag: 'n', .. }));
    }

    #[test]
    fn test_salvage() {
        assert_eq!(salvage("status -i one"), ("status".to_string(), 0));
        assert_eq!(salvage("step_into -x -i 9"), ("step_into".to_string(), 9));
        assert_eq!(salvage(""), ("unknown".to_string(), 0));
    }
}
