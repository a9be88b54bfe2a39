//! Coordinate hash for painted cells

use crate::CellKeyError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A grid coordinate whose text form is the literal `"{x},{y}"`.
///
/// Paint changes key their pre/post maps by this value and recover the
/// coordinate by splitting the text on `,`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub x: u32,
    pub y: u32,
}

impl CellKey {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for CellKey {
    type Err = CellKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CellKeyError(s.to_string());
        let (x, y) = s.split_once(',').ok_or_else(malformed)?;
        Ok(Self {
            x: x.trim().parse().map_err(|_| malformed())?,
            y: y.trim().parse().map_err(|_| malformed())?,
        })
    }
}

impl Serialize for CellKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CellKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
