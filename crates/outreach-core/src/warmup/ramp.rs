//! Day-by-day warmup volume table

/// Days until an account is considered warmed up
pub const RAMP_DAYS: i32 = 35;

/// Inclusive range of warmup emails for one day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampEntry {
    pub min: u32,
    pub max: u32,
}

#[rustfmt::skip]
const TABLE: [(u32, u32); RAMP_DAYS as usize] = [
    // Week 1
    (2, 3), (3, 5), (4, 6), (5, 8), (6, 10), (8, 12), (10, 15),
    // Week 2
    (12, 18), (14, 20), (16, 22), (18, 25), (20, 28), (22, 30), (25, 32),
    // Week 3
    (28, 35), (30, 38), (32, 40), (35, 43), (38, 46), (40, 50), (43, 53),
    // Week 4
    (46, 56), (50, 60), (53, 63), (56, 66), (60, 70), (63, 73), (66, 76),
    // Week 5
    (70, 80), (73, 83), (76, 86), (80, 90), (83, 93), (86, 96), (90, 100),
];

/// Fixed five-week ramp
pub struct RampTable;

impl RampTable {
    /// Entry for a warmup day; out-of-range days clamp to the first or last entry
    pub fn entry(day: i32) -> RampEntry {
        let index = (day.clamp(1, RAMP_DAYS) - 1) as usize;
        let (min, max) = TABLE[index];
        RampEntry { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_and_last_day() {
        assert_eq!(RampTable::entry(1), RampEntry { min: 2, max: 3 });
        assert_eq!(RampTable::entry(35), RampEntry { min: 90, max: 100 });
    }

    #[test]
    fn test_out_of_range_clamps() {
        assert_eq!(RampTable::entry(0), RampTable::entry(1));
        assert_eq!(RampTable::entry(-4), RampTable::entry(1));
        assert_eq!(RampTable::entry(36), RampEntry { min: 90, max: 100 });
        assert_eq!(RampTable::entry(1000), RampEntry { min: 90, max: 100 });
    }

    #[test]
    fn test_max_is_monotonic() {
        for d1 in 1..=RAMP_DAYS {
            for d2 in d1..=RAMP_DAYS {
                assert!(RampTable::entry(d2).max >= RampTable::entry(d1).max);
            }
        }
    }

    #[test]
    fn test_ranges_are_well_formed() {
        for day in 1..=RAMP_DAYS {
            let entry = RampTable::entry(day);
            assert!(entry.min <= entry.max, "day {}", day);
        }
    }
}
