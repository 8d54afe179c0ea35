//! Command-level errors
//!
//! Every variant is recoverable: the offending command is dropped and
//! logged with its raw text while the rest of the frame keeps going.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command")]
    Unknown,
    #[error("expected {expected} arguments, got {got}")]
    ArgCount { expected: usize, got: usize },
    #[error("argument {index} out of range or malformed: {value:?}")]
    BadArg { index: usize, value: String },
    #[error("{0} is not whitelisted")]
    NotAllowed(String),
    #[error("no such {0}")]
    Dangling(&'static str),
    #[error("not in a room")]
    NoRoom,
    #[error("sender is muted")]
    Muted,
    #[error("permission denied")]
    Forbidden,
    #[error("already {0}")]
    Already(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type CommandResult = Result<(), CommandError>;

/// Positional argument parsing with range checks
pub struct Args<'a> {
    args: &'a [String],
}

impl<'a> Args<'a> {
    /// Requires exactly `expected` arguments
    pub fn exact(args: &'a [String], expected: usize) -> Result<Self, CommandError> {
        if args.len() != expected {
            return Err(CommandError::ArgCount {
                expected,
                got: args.len(),
            });
        }
        Ok(Self { args })
    }

    pub fn str(&self, index: usize) -> &'a str {
        &self.args[index]
    }

    pub fn int<T>(&self, index: usize, min: T, max: T) -> Result<T, CommandError>
    where
        T: std::str::FromStr + PartialOrd + Copy,
    {
        let raw = &self.args[index];
        match raw.parse::<T>() {
            Ok(value) if value >= min && value <= max => Ok(value),
            _ => Err(CommandError::BadArg {
                index,
                value: raw.clone(),
            }),
        }
    }

    /// Accepts only `0` or `1`
    pub fn flag(&self, index: usize) -> Result<bool, CommandError> {
        Ok(self.int::<u8>(index, 0, 1)? == 1)
    }

    /// Non-empty text of at most `max_chars` characters
    pub fn text(&self, index: usize, max_chars: usize) -> Result<&'a str, CommandError> {
        let raw = self.str(index);
        let len = raw.chars().count();
        if len == 0 || len > max_chars {
            return Err(CommandError::BadArg {
                index,
                value: raw.to_string(),
            });
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_exact_count() {
        let raw = owned(&["1", "2"]);
        assert!(Args::exact(&raw, 2).is_ok());
        assert!(matches!(
            Args::exact(&raw, 3),
            Err(CommandError::ArgCount { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_int_ranges() {
        let raw = owned(&["5", "-1", "x", "11"]);
        let args = Args::exact(&raw, 4).unwrap();
        assert_eq!(args.int::<u8>(0, 0, 10).unwrap(), 5);
        assert!(args.int::<u16>(1, 0, 100).is_err());
        assert!(args.int::<i32>(2, 0, 100).is_err());
        assert!(args.int::<u8>(3, 0, 10).is_err());
    }

    #[test]
    fn test_flag_and_text() {
        let raw = owned(&["1", "2", "hello", ""]);
        let args = Args::exact(&raw, 4).unwrap();
        assert!(args.flag(0).unwrap());
        assert!(args.flag(1).is_err());
        assert_eq!(args.text(2, 5).unwrap(), "hello");
        assert!(args.text(2, 4).is_err());
        assert!(args.text(3, 4).is_err());
    }
}
