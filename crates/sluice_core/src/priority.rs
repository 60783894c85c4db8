//! Request priority lanes.

use serde::{Deserialize, Serialize};

/// Scheduling priority of a request.
///
/// Variants are declared from most to least urgent; iterating with
/// `strum::IntoEnumIterator` yields lanes in drain order.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumIter,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    /// Interactive, user-facing work.
    High,
    /// Default lane.
    #[default]
    Normal,
    /// Background work; may starve under sustained higher-priority load.
    Low,
}

impl Priority {
    /// Index of this lane, 0 being the most urgent.
    pub fn lane(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_lanes_iterate_in_drain_order() {
        let lanes: Vec<usize> = Priority::iter().map(Priority::lane).collect();
        assert_eq!(lanes, vec![0, 1, 2]);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(Priority::from_str("high").unwrap(), Priority::High);
        assert_eq!(Priority::Low.to_string(), "low");
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
