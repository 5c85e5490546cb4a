//! matcher.rs
//! The temporal matching primitive shared by every feature: for each row of
//! the `from` table, the rows of the `to` table that share its join key and
//! lie inside the admissible time range.

use crate::error::Result;
use crate::graph::JoinEdge;
use crate::store::Table;
use rayon::prelude::*;
use std::collections::HashMap;

/// Matched rows in CSR layout: the matches of row `i` are
/// `rows[offsets[i]..offsets[i + 1]]`, sorted by row index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matches {
    offsets: Vec<usize>,
    rows: Vec<u32>,
}

impl Matches {
    #[inline(always)]
    pub fn of(&self, i: usize) -> &[u32] {
        &self.rows[self.offsets[i]..self.offsets[i + 1]]
    }

    /// Position in the flat pair list of the first match of row `i`.
    #[inline(always)]
    pub fn offset(&self, i: usize) -> usize { self.offsets[i] }

    pub fn len(&self) -> usize { self.offsets.len().saturating_sub(1) }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn n_pairs(&self) -> usize { self.rows.len() }
    pub fn pairs(&self) -> &[u32] { &self.rows }

    fn from_lists(lists: Vec<Vec<u32>>) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        offsets.push(0);
        let mut rows = Vec::with_capacity(lists.iter().map(Vec::len).sum());
        for list in lists {
            rows.extend_from_slice(&list);
            offsets.push(rows.len());
        }
        Self { offsets, rows }
    }
}

/// Rows of the joined table grouped by join key, each group sorted by time stamp.
struct JoinIndex<'a> {
    groups: HashMap<&'a str, Vec<(f64, u32)>>,
}

impl<'a> JoinIndex<'a> {
    fn build(keys: &'a [Option<String>], stamps: Option<&[f64]>) -> Self {
        let mut groups: HashMap<&'a str, Vec<(f64, u32)>> = HashMap::new();
        for (row, key) in keys.iter().enumerate() {
            let Some(key) = key.as_deref() else { continue };
            let ts = match stamps {
                Some(s) if s[row].is_nan() => continue,
                Some(s) => s[row],
                None => 0.0,
            };
            groups.entry(key).or_default().push((ts, row as u32));
        }
        for group in groups.values_mut() {
            group.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        }
        Self { groups }
    }
}

/// Computes the matches of every row of `from` along `edge`.
///
/// Rows with a missing join key or time stamp, on either side, never match.
pub fn match_rows(edge: &JoinEdge, from: &Table, to: &Table) -> Result<Matches> {
    let keys = from.text(&edge.join_key)?;
    let other_keys = to.text(&edge.other_join_key)?;

    let (stamps, other_stamps) = match (&edge.time_stamp, &edge.other_time_stamp) {
        (Some(ts), Some(other)) => (Some(from.numeric(ts)?), Some(to.numeric(other)?)),
        _ => (None, None),
    };
    let upper = match &edge.upper_time_stamp {
        Some(col) => Some(to.numeric(col)?),
        None => None,
    };

    let index = JoinIndex::build(other_keys, other_stamps);
    let reach = edge.horizon + edge.max_window.unwrap_or(f64::INFINITY);

    let lists: Vec<Vec<u32>> = (0..from.n_rows()).into_par_iter().map(|i| {
        let Some(group) = keys[i].as_deref().and_then(|k| index.groups.get(k)) else {
            return Vec::new();
        };

        let mut rows: Vec<u32> = match stamps {
            None => group.iter().map(|&(_, row)| row).collect(),
            Some(s) => {
                let ts = s[i];
                if ts.is_nan() { return Vec::new(); }
                let latest = ts - edge.horizon;
                let earliest = ts - reach;
                let end = group.partition_point(|&(t, _)| t <= latest);
                let start = group[..end].partition_point(|&(t, _)| t < earliest);
                group[start..end].iter()
                    .filter(|&&(_, row)| upper.map_or(true, |u| {
                        let valid_until = u[row as usize];
                        valid_until.is_nan() || valid_until > ts
                    }))
                    .map(|&(_, row)| row)
                    .collect()
            }
        };
        rows.sort_unstable();
        rows
    }).collect();

    Ok(Matches::from_lists(lists))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::JoinSpec;
    use crate::store::{Roles, Value};
    use proptest::prelude::*;

    fn table(name: &str, rows: &[(Option<&str>, f64)]) -> Table {
        let roles = Roles::new().join_key("jk").time_stamp("ts");
        let rows: Vec<Vec<Value>> = rows.iter()
            .map(|&(k, t)| vec![Value::from(k), Value::from(t)])
            .collect();
        Table::from_rows(name, &roles, &["jk", "ts"], &rows).unwrap()
    }

    fn count(m: &Matches) -> Vec<usize> {
        (0..m.len()).map(|i| m.of(i).len()).collect()
    }

    #[test]
    fn test_matches_exclude_future_rows() {
        let pop = table("POPULATION", &[(Some("A"), 10.0), (Some("B"), 20.0), (Some("C"), 30.0)]);
        let per = table("PERIPHERAL", &[(Some("A"), 9.0), (Some("A"), 11.0), (Some("B"), 15.0)]);
        let edge = JoinSpec::new("jk").time_stamp("ts").into_edge();
        let m = match_rows(&edge, &pop, &per).unwrap();
        assert_eq!(count(&m), vec![1, 1, 0]);
        assert_eq!(m.of(0), &[0]);
        assert_eq!(m.of(1), &[2]);
    }

    #[test]
    fn test_equal_time_stamp_matches() {
        let pop = table("POPULATION", &[(Some("A"), 10.0), (Some("A"), 12.0)]);
        let per = table("PERIPHERAL", &[(Some("A"), 9.0), (Some("A"), 11.0)]);
        let edge = JoinSpec::new("jk").time_stamp("ts").into_edge();
        let m = match_rows(&edge, &pop, &per).unwrap();
        assert_eq!(count(&m), vec![1, 2]);
    }

    #[test]
    fn test_window_and_horizon() {
        let pop = table("POPULATION", &[(Some("A"), 10.0)]);
        let per = table("PERIPHERAL", &[(Some("A"), 4.0), (Some("A"), 6.0), (Some("A"), 8.0), (Some("A"), 9.5)]);
        let windowed = JoinSpec::new("jk").time_stamp("ts").max_window(4.0).into_edge();
        assert_eq!(match_rows(&windowed, &pop, &per).unwrap().of(0), &[1, 2, 3]);
        let lagged = JoinSpec::new("jk").time_stamp("ts").horizon(1.0).max_window(3.0).into_edge();
        assert_eq!(match_rows(&lagged, &pop, &per).unwrap().of(0), &[1, 2]);
    }

    #[test]
    fn test_missing_keys_and_stamps_never_match() {
        let pop = table("POPULATION", &[(None, 10.0), (Some("A"), f64::NAN), (Some("A"), 10.0)]);
        let per = table("PERIPHERAL", &[(Some("A"), 1.0), (None, 1.0), (Some("A"), f64::NAN)]);
        let edge = JoinSpec::new("jk").time_stamp("ts").into_edge();
        let m = match_rows(&edge, &pop, &per).unwrap();
        assert_eq!(count(&m), vec![0, 0, 1]);
        assert_eq!(m.n_pairs(), 1);
    }

    #[test]
    fn test_non_temporal_join_matches_all() {
        let pop = table("POPULATION", &[(Some("A"), 0.0)]);
        let per = table("PERIPHERAL", &[(Some("A"), 5.0), (Some("A"), 50.0)]);
        let edge = JoinSpec::new("jk").into_edge();
        assert_eq!(match_rows(&edge, &pop, &per).unwrap().of(0), &[0, 1]);
    }

    #[test]
    fn test_upper_time_stamp() {
        let roles = Roles::new().join_key("jk").time_stamp("ts").time_stamp("end");
        let per = Table::from_rows("PERIPHERAL", &roles, &["jk", "ts", "end"], &[
            vec!["A".into(), 1.0.into(), 5.0.into()],
            vec!["A".into(), 2.0.into(), 20.0.into()],
            vec!["A".into(), 3.0.into(), Value::Null],
        ]).unwrap();
        let pop = table("POPULATION", &[(Some("A"), 10.0)]);
        let edge = JoinSpec::new("jk").time_stamp("ts").upper_time_stamp("end").into_edge();
        assert_eq!(match_rows(&edge, &pop, &per).unwrap().of(0), &[1, 2]);
    }

    proptest! {
        #[test]
        fn prop_no_match_is_later_than_population_row(
            pop_ts in proptest::collection::vec(0.0f64..100.0, 1..20),
            per in proptest::collection::vec((0u8..3, 0.0f64..100.0), 0..40),
            window in proptest::option::of(0.5f64..50.0),
            horizon in 0.0f64..10.0,
        ) {
            let pop_rows: Vec<(Option<String>, f64)> = pop_ts.iter().enumerate()
                .map(|(i, &t)| (Some(format!("k{}", i % 3)), t)).collect();
            let per_rows: Vec<(Option<String>, f64)> = per.iter()
                .map(|&(k, t)| (Some(format!("k{}", k)), t)).collect();
            fn as_refs(rows: &[(Option<String>, f64)]) -> Vec<(Option<&str>, f64)> {
                rows.iter().map(|(k, t)| (k.as_deref(), *t)).collect()
            }
            let pop = table("POPULATION", &as_refs(&pop_rows));
            let peripheral = table("PERIPHERAL", &as_refs(&per_rows));

            let mut spec = JoinSpec::new("jk").time_stamp("ts").horizon(horizon);
            if let Some(w) = window { spec = spec.max_window(w); }
            let edge = spec.into_edge();
            let m = match_rows(&edge, &pop, &peripheral).unwrap();

            let per_ts = peripheral.numeric("ts").unwrap();
            for (i, &(_, t)) in pop_rows.iter().enumerate() {
                let mut expected = 0;
                for (j, (k, pt)) in per_rows.iter().enumerate() {
                    let in_range = *pt <= t - horizon && window.map_or(true, |w| *pt >= t - (horizon + w));
                    if k == &pop_rows[i].0 && in_range { expected += 1; }
                    if m.of(i).contains(&(j as u32)) {
                        prop_assert!(per_ts[j] <= t);
                    }
                }
                prop_assert_eq!(m.of(i).len(), expected);
            }
        }
    }
}
