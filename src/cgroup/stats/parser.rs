//! Generic traits for parsing kernel accounting files into structured types.
//!
//! - [`KeyValueStat`]: multi-line files with one whitespace separated `key value` pair per
//!   line, such as the cgroup v2 `cpu.stat`. Unknown keys are skipped.
//! - [`SingleLineStat`]: files holding a single value, such as `cpuacct.usage` or a resctrl
//!   monitoring counter.
//!
//! # Example: Implementing `KeyValueStat`
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::LazyLock;
//! use creo_sampler::cgroup::stats::KeyValueStat;
//!
//! #[derive(Default)]
//! struct MyStat {
//!     foo: u64,
//! }
//!
//! static HANDLERS: LazyLock<HashMap<&'static str, fn(&mut MyStat, u64)>> =
//!     LazyLock::new(|| HashMap::from([("foo", (|s: &mut MyStat, v| s.foo = v) as fn(&mut MyStat, u64))]));
//!
//! impl KeyValueStat for MyStat {
//!     fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
//!         &HANDLERS
//!     }
//! }
//!
//! let stat = MyStat::from_reader(&mut "bar 1\nfoo 2\n".as_bytes()).unwrap();
//! assert_eq!(stat.foo, 2);
//! ```

use std::collections::HashMap;
use std::io::BufRead;

use super::StatParseError;

/// A trait for parsing `key value` per line files.
///
/// Implementors name the keys they care about and how each parsed value is applied.
/// Parsing stops early once every known key has been seen.
pub trait KeyValueStat: Default
where
    Self: 'static,
{
    /// Returns a map of known field names to handlers applying the parsed value.
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)>;

    /// Parses a key-value formatted buffer.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if reading fails, or a [`StatParseError::InvalidKeyValue`]
    /// wrapped in `io::Error` if the value of a known key is not a `u64`.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = Self::default();
        let handlers = Self::field_handlers();
        let mut remaining = handlers.len();

        let mut line = String::new();
        let mut lineno = 0;
        while remaining > 0 && buf.read_line(&mut line)? != 0 {
            lineno += 1;
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
                if let Some(handler) = handlers.get(key) {
                    let parsed =
                        val.parse::<u64>()
                            .map_err(|source| StatParseError::InvalidKeyValue {
                                key: key.to_string(),
                                value: val.to_string(),
                                line: lineno,
                                source,
                            })?;
                    handler(&mut stat, parsed);
                    remaining -= 1;
                }
            }
            line.clear();
        }

        Ok(stat)
    }
}

/// A trait for parsing single-value statistics.
pub trait SingleLineStat: Sized {
    /// Parses the statistic from the provided buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if reading or parsing fails.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self>;
}

/// Reads the first line of `buf` and parses it, trimmed, as a `u64`.
pub(crate) fn parse_single_value<R: BufRead>(buf: &mut R) -> std::io::Result<u64> {
    let mut line = String::new();
    if buf.read_line(&mut line)? == 0 {
        return Err(StatParseError::MissingLine { line: 1 }.into());
    }
    let value = line.trim();
    value.parse::<u64>().map_err(|source| {
        StatParseError::InvalidValue {
            value: value.to_string(),
            line: 1,
            source,
        }
        .into()
    })
}
