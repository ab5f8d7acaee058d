//! Human-readable rate limit strings.
//!
//! The accepted form is `<operations>/[<period>]<unit>`, where `<period>` is an
//! optional decimal multiplier (default `1`) and `<unit>` is one of `s`, `m`,
//! `h` or `d`:
//!
//! ```
//! use std::time::Duration;
//! use keyrate::ratelimit::parse_rate_limit;
//!
//! let limit = parse_rate_limit("100/1.5h").unwrap();
//! assert_eq!(limit.operations(), 100);
//! assert_eq!(limit.period(), Duration::from_secs(5400));
//! ```

use std::time::Duration;

use thiserror::Error;

use super::rate::RateLimit;

/// Errors produced while parsing a rate limit string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseRateLimitError {
    /// The input stopped before the unit character.
    #[error("Unexpected end of rate limit string.")]
    UnexpectedEnd,

    /// A character that cannot appear at this position.
    #[error("Unknown character {character:?} at position {offset}\n    {input}\n    {}^", caret(.offset))]
    UnknownCharacter {
        input: String,
        offset: usize,
        character: char,
    },

    /// Nothing before the `/`.
    #[error("Missing operation count before '/'")]
    MissingOperations,

    /// A number that does not fit the target type.
    #[error("Number out of range: {0}")]
    OutOfRange(String),
}

fn caret(offset: &usize) -> String {
    " ".repeat(*offset)
}

fn unit_seconds(character: char) -> Option<f64> {
    match character {
        's' => Some(1.0),
        'm' => Some(60.0),
        'h' => Some(3_600.0),
        'd' => Some(86_400.0),
        _ => None,
    }
}

fn unknown(input: &str, offset: usize, character: char) -> ParseRateLimitError {
    ParseRateLimitError::UnknownCharacter {
        input: input.to_string(),
        offset,
        character,
    }
}

/// Parse a string such as `"100/m"` or `"1/1.5h"` into a [`RateLimit`].
pub fn parse_rate_limit(input: &str) -> Result<RateLimit, ParseRateLimitError> {
    let mut chars = input.chars().enumerate();

    let mut operations = String::new();
    loop {
        match chars.next() {
            None => return Err(ParseRateLimitError::UnexpectedEnd),
            Some((_, '/')) => break,
            Some((_, c)) if c.is_ascii_digit() => operations.push(c),
            Some((offset, c)) => return Err(unknown(input, offset, c)),
        }
    }

    let mut multiplier = String::new();
    let unit = loop {
        match chars.next() {
            None => return Err(ParseRateLimitError::UnexpectedEnd),
            Some((_, '.')) if !multiplier.is_empty() && !multiplier.contains('.') => {
                multiplier.push('.')
            }
            Some((_, c)) if c.is_ascii_digit() => multiplier.push(c),
            Some((offset, c)) => match unit_seconds(c) {
                Some(seconds) => break seconds,
                None => return Err(unknown(input, offset, c)),
            },
        }
    };

    if let Some((offset, c)) = chars.next() {
        return Err(unknown(input, offset, c));
    }

    if operations.is_empty() {
        return Err(ParseRateLimitError::MissingOperations);
    }

    let operations: u64 = operations
        .parse()
        .map_err(|_| ParseRateLimitError::OutOfRange(operations.clone()))?;

    let multiplier: f64 = if multiplier.is_empty() {
        1.0
    } else {
        multiplier
            .parse()
            .map_err(|_| ParseRateLimitError::OutOfRange(multiplier.clone()))?
    };

    let period = Duration::try_from_secs_f64(unit * multiplier)
        .map_err(|e| ParseRateLimitError::OutOfRange(e.to_string()))?;

    RateLimit::new(operations, period).map_err(|e| ParseRateLimitError::OutOfRange(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(operations: u64, secs: u64) -> RateLimit {
        RateLimit::new(operations, Duration::from_secs(secs)).unwrap()
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_rate_limit("1/s").unwrap(), limit(1, 1));
        assert_eq!(parse_rate_limit("100/m").unwrap(), limit(100, 60));
        assert_eq!(parse_rate_limit("1/h").unwrap(), limit(1, 3_600));
        assert_eq!(parse_rate_limit("1/d").unwrap(), limit(1, 86_400));
    }

    #[test]
    fn test_parse_period_multiplier() {
        assert_eq!(parse_rate_limit("1/1.5h").unwrap(), limit(1, 5_400));
        assert_eq!(parse_rate_limit("1/1.5m").unwrap(), limit(1, 90));
        assert_eq!(parse_rate_limit("100/5m").unwrap(), limit(100, 300));
    }

    #[test]
    fn test_parse_unexpected_end() {
        for input in ["", "/", "1", "1/", "1/1.5"] {
            assert_eq!(
                parse_rate_limit(input),
                Err(ParseRateLimitError::UnexpectedEnd),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn test_parse_unknown_character() {
        let err = parse_rate_limit("1m").unwrap_err();
        assert_eq!(
            err,
            ParseRateLimitError::UnknownCharacter {
                input: "1m".to_string(),
                offset: 1,
                character: 'm',
            }
        );
        assert!(err.to_string().contains("Unknown character 'm' at position 1"));
        assert!(err.to_string().ends_with("\n    1m\n     ^"));

        let err = parse_rate_limit("1/y").unwrap_err();
        assert!(matches!(
            err,
            ParseRateLimitError::UnknownCharacter { offset: 2, character: 'y', .. }
        ));
    }

    #[test]
    fn test_parse_rejects_misplaced_dots() {
        assert!(matches!(
            parse_rate_limit("1/.5m"),
            Err(ParseRateLimitError::UnknownCharacter { offset: 2, .. })
        ));
        assert!(matches!(
            parse_rate_limit("1/1.5.5m"),
            Err(ParseRateLimitError::UnknownCharacter { offset: 5, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_trailing_input() {
        assert!(matches!(
            parse_rate_limit("10/ms"),
            Err(ParseRateLimitError::UnknownCharacter { offset: 4, character: 's', .. })
        ));
    }

    #[test]
    fn test_parse_missing_operations() {
        assert_eq!(
            parse_rate_limit("/m"),
            Err(ParseRateLimitError::MissingOperations)
        );
    }

    #[test]
    fn test_parse_rejects_zero_values() {
        assert!(matches!(
            parse_rate_limit("0/m"),
            Err(ParseRateLimitError::OutOfRange(_))
        ));
        assert!(matches!(
            parse_rate_limit("1/0m"),
            Err(ParseRateLimitError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_parse_rejects_overflowing_operations() {
        assert!(matches!(
            parse_rate_limit("99999999999999999999999/s"),
            Err(ParseRateLimitError::OutOfRange(_))
        ));
    }
}
