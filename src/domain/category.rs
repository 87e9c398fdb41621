//! Content categories and the user's category selection.
//!
//! There are exactly four categories, each fed by one monitored channel.
//! A user browses either one category or all of them at once (mix mode).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a number or label does not name a category
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown category: {0}")]
pub struct UnknownCategory(pub String);

/// One of the four fixed content buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Category {
    One,
    Two,
    Three,
    Four,
}

impl Category {
    /// All categories in display order
    pub const ALL: [Category; 4] = [Category::One, Category::Two, Category::Three, Category::Four];

    /// The 1-based category number
    pub fn number(self) -> u8 {
        match self {
            Category::One => 1,
            Category::Two => 2,
            Category::Three => 3,
            Category::Four => 4,
        }
    }

    /// Look up a category by its 1-based number
    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            1 => Some(Category::One),
            2 => Some(Category::Two),
            3 => Some(Category::Three),
            4 => Some(Category::Four),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Category {
    type Error = UnknownCategory;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Category::from_number(n as i64).ok_or_else(|| UnknownCategory(n.to_string()))
    }
}

impl From<Category> for u8 {
    fn from(c: Category) -> Self {
        c.number()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// What a user is currently browsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// A single category, browsed in order
    Category(Category),

    /// Random draws across all non-empty categories
    Mix,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Category(Category::One)
    }
}

impl Selection {
    /// Storage code: 0 for mix, 1..=4 for categories
    pub fn code(self) -> i64 {
        match self {
            Selection::Mix => 0,
            Selection::Category(c) => c.number() as i64,
        }
    }

    /// Decode a storage code
    pub fn from_code(code: i64) -> Option<Self> {
        if code == 0 {
            Some(Selection::Mix)
        } else {
            Category::from_number(code).map(Selection::Category)
        }
    }

    /// The fixed category, if not in mix mode
    pub fn category(self) -> Option<Category> {
        match self {
            Selection::Category(c) => Some(c),
            Selection::Mix => None,
        }
    }

    pub fn is_mix(self) -> bool {
        matches!(self, Selection::Mix)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Category(c) => write!(f, "category {}", c),
            Selection::Mix => write!(f, "mix"),
        }
    }
}

impl FromStr for Selection {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "mix" {
            return Ok(Selection::Mix);
        }
        s.parse::<i64>()
            .ok()
            .and_then(Category::from_number)
            .map(Selection::Category)
            .ok_or(UnknownCategory(s))
    }
}
