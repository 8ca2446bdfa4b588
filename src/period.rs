use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Billing period: one calendar month, written `YYYY-MM`.
///
/// Ordering is chronological, so `BTreeMap<Period, _>` iterates oldest first.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: u16,
    month: u8,
}

impl Period {
    pub fn new(year: u16, month: u8) -> Result<Self> {
        if !(1..=12).contains(&month) || year == 0 || year > 9999 {
            return Err(Error::InvalidPeriod(format!("{:04}-{:02}", year, month)));
        }
        Ok(Period { year, month })
    }

    /// Parse a strict `YYYY-MM` identifier.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidPeriod(s.to_string());
        let (y, m) = s.split_once('-').ok_or_else(invalid)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(invalid());
        }
        if !y.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: u16 = y.parse().map_err(|_| invalid())?;
        let month: u8 = m.parse().map_err(|_| invalid())?;
        Period::new(year, month).map_err(|_| invalid())
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    /// The month before this one. Saturates at 0001-01.
    pub fn previous(&self) -> Period {
        match (self.year, self.month) {
            (1, 1) => *self,
            (y, 1) => Period { year: y - 1, month: 12 },
            (y, m) => Period { year: y, month: m - 1 },
        }
    }

    /// The month after this one. Saturates at 9999-12.
    pub fn next(&self) -> Period {
        match (self.year, self.month) {
            (9999, 12) => *self,
            (y, 12) => Period { year: y + 1, month: 1 },
            (y, m) => Period { year: y, month: m + 1 },
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Period::parse(s)
    }
}

impl TryFrom<String> for Period {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Period::parse(&s)
    }
}

impl From<Period> for String {
    fn from(p: Period) -> String {
        p.to_string()
    }
}
