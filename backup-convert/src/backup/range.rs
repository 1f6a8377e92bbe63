//! Range expressions selecting a contiguous run of backups.
//!
//! Accepted forms, with 1-based inclusive positions in listing order:
//!
//! | Expression   | Selection                 |
//! |--------------|---------------------------|
//! | `""`, `all`  | every backup              |
//! | `n`          | the n-th backup           |
//! | `l-u`        | backups l through u       |
//! | `l-`         | backup l through the last |
//! | `-u`         | the first through u       |

use super::{Backup, BackupCollection};
use crate::utils::{ConvertError, Result};
use std::ops::Range;

/// Resolve `expression` against `collection`, returning the selected
/// backups in listing order.
pub fn resolve(expression: &str, collection: &BackupCollection) -> Result<Vec<Backup>> {
    let bounds = bounds(expression, collection.len())?;
    Ok(collection.as_slice()[bounds].to_vec())
}

/// Translate `expression` into a 0-based half-open index range over a
/// collection of `size` elements.
pub fn bounds(expression: &str, size: usize) -> Result<Range<usize>> {
    let expression = expression.trim().to_lowercase();

    if expression.is_empty() || expression == "all" {
        return Ok(0..size);
    }

    if expression.chars().all(|c| c.is_ascii_digit()) {
        let n = parse_position(&expression)?;
        if n < 1 || n > size {
            return Err(ConvertError::InvalidRange(format!(
                "{} is not within 1..={}",
                n, size
            )));
        }
        return Ok(n - 1..n);
    }

    if let Some((left, right)) = expression.split_once('-') {
        // lower stays signed so that "0-" is rejected rather than wrapping
        let lower = if left.is_empty() {
            0
        } else {
            parse_position(left)? as i128 - 1
        };
        let upper = if right.is_empty() {
            size
        } else {
            parse_position(right)?
        };

        if lower < 0 || lower >= upper as i128 || upper > size {
            return Err(ConvertError::InvalidRange(format!(
                "value not within range: 0 <= {} < {} <= {}",
                lower, upper, size
            )));
        }
        return Ok(lower as usize..upper);
    }

    Err(ConvertError::InvalidRange(format!(
        "unrecognized expression '{}'",
        expression
    )))
}

fn parse_position(text: &str) -> Result<usize> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConvertError::InvalidRange(format!("'{}' is not a position", text)));
    }
    text.parse::<usize>()
        .map_err(|e| ConvertError::InvalidRange(format!("'{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn collection(size: usize) -> BackupCollection {
        let backups = (1..=size)
            .map(|i| {
                let time = Utc.with_ymd_and_hms(2024, 1, i as u32, 0, 0, 0).unwrap();
                Backup::new(format!("B{}", i), format!("B{}", i), time, serde_json::Value::Null)
            })
            .collect::<Vec<_>>();
        BackupCollection::try_from(backups).unwrap()
    }

    fn names(expression: &str, collection: &BackupCollection) -> Vec<String> {
        resolve(expression, collection)
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect()
    }

    #[test]
    fn test_empty_and_all_select_everything() {
        let c = collection(5);
        let all = names("", &c);
        assert_eq!(all, vec!["B1", "B2", "B3", "B4", "B5"]);
        assert_eq!(names("all", &c), all);
        assert_eq!(names(" ALL ", &c), all);
    }

    #[test]
    fn test_single_position() {
        let c = collection(5);
        for n in 1..=5 {
            assert_eq!(names(&n.to_string(), &c), vec![format!("B{}", n)]);
        }
        assert!(matches!(resolve("0", &c), Err(ConvertError::InvalidRange(_))));
        assert!(matches!(resolve("6", &c), Err(ConvertError::InvalidRange(_))));
    }

    #[test]
    fn test_bounded_range_is_inclusive() {
        let c = collection(5);
        assert_eq!(names("2-4", &c), vec!["B2", "B3", "B4"]);
        assert_eq!(names("1-5", &c).len(), 5);
        assert_eq!(names("4-5", &c), vec!["B4", "B5"]);
    }

    #[test]
    fn test_open_ranges() {
        let c = collection(5);
        assert_eq!(names("3-", &c), vec!["B3", "B4", "B5"]);
        assert_eq!(names("3-", &c), names("3-5", &c));
        assert_eq!(names("-3", &c), vec!["B1", "B2", "B3"]);
        assert_eq!(names("-3", &c), names("1-3", &c));
        assert_eq!(names("-", &c).len(), 5);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let c = collection(5);
        for expression in ["9", "9-", "-9", "0-3", "4-2", "6-"] {
            assert!(
                matches!(resolve(expression, &c), Err(ConvertError::InvalidRange(_))),
                "{} should be rejected",
                expression
            );
        }
    }

    #[test]
    fn test_malformed_rejected() {
        let c = collection(5);
        for expression in ["x", "1-x", "a-3", "1-2-3", "+1", "1.5", "99999999999999999999999"] {
            assert!(
                matches!(resolve(expression, &c), Err(ConvertError::InvalidRange(_))),
                "{} should be rejected",
                expression
            );
        }
    }

    #[test]
    fn test_empty_collection() {
        let c = collection(0);
        assert!(resolve("all", &c).unwrap().is_empty());
        assert!(resolve("1", &c).is_err());
        assert!(resolve("-", &c).is_err());
    }
}
