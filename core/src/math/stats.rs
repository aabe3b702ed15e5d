/// Smallest and largest value of a non-empty sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min: f64,
    pub max: f64,
}

pub struct StatsHelper;

impl StatsHelper {
    /// Plain numeric min/max; `None` for an empty sequence.
    pub fn extent<'a, I>(values: I) -> Option<Extent>
    where
        I: IntoIterator<Item = &'a f64>,
    {
        values.into_iter().fold(None, |acc, &value| match acc {
            None => Some(Extent {
                min: value,
                max: value,
            }),
            Some(extent) => Some(Extent {
                min: extent.min.min(value),
                max: extent.max.max(value),
            }),
        })
    }

    /// Union of two optional extents.
    pub fn merge(lhs: Option<Extent>, rhs: Option<Extent>) -> Option<Extent> {
        match (lhs, rhs) {
            (Some(a), Some(b)) => Some(Extent {
                min: a.min.min(b.min),
                max: a.max.max(b.max),
            }),
            (a, None) => a,
            (None, b) => b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_of_empty_sequence_is_none() {
        let empty: [f64; 0] = [];
        assert_eq!(StatsHelper::extent(&empty), None);
    }

    #[test]
    fn extent_tracks_negative_values() {
        let extent = StatsHelper::extent(&[3.0, -1.5, 8.0, 0.0]).unwrap();
        assert_eq!(extent.min, -1.5);
        assert_eq!(extent.max, 8.0);
    }

    #[test]
    fn merge_keeps_outer_bounds() {
        let a = StatsHelper::extent(&[2.0, 10.0]);
        let b = StatsHelper::extent(&[5.0, 20.0]);
        let merged = StatsHelper::merge(a, b).unwrap();
        assert_eq!((merged.min, merged.max), (2.0, 20.0));
        assert_eq!(StatsHelper::merge(a, None), a);
    }
}
