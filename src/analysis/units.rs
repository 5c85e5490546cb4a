// Unit rules deciding which columns the generator may combine.

use crate::store::Unit;
use std::collections::BTreeMap;

/// A unit expression reduced to base terms with integer exponents, so that
/// `m*s`, `s*m` and `m^2*s/m` all compare equal.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    terms: BTreeMap<String, i32>,
}

impl ParsedUnit {
    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().is_empty() { return None; }

        let mut terms = BTreeMap::new();
        let mut parts = s.split('/');

        if let Some(num) = parts.next() { Self::parse_product(num, 1, &mut terms)?; }
        if let Some(den) = parts.next() { Self::parse_product(den, -1, &mut terms)?; }
        if parts.next().is_some() { return None; } // Multiple slashes

        terms.retain(|_, exp| *exp != 0);
        Some(Self { terms })
    }

    fn parse_product(s: &str, sign: i32, terms: &mut BTreeMap<String, i32>) -> Option<()> {
        if s.trim().is_empty() || s.trim() == "1" { return Some(()); }
        for factor in s.split('*') {
            let mut parts = factor.split('^');
            let base = parts.next()?.trim();
            if base.is_empty() { return None; }
            let exp = parts.next().unwrap_or("1").trim().parse::<i32>().ok()?;
            *terms.entry(base.to_string()).or_insert(0) += exp * sign;
        }
        Some(())
    }

    pub fn canonical(&self) -> String {
        let (num, den): (Vec<_>, Vec<_>) = self.terms.iter().partition(|&(_, &v)| v > 0);

        let fmt = |terms: Vec<(&String, &i32)>| -> String {
            if terms.is_empty() { return "1".to_string(); }
            terms.into_iter()
                .map(|(k, v)| if v.abs() == 1 { k.clone() } else { format!("{}^{}", k, v.abs()) })
                .collect::<Vec<_>>()
                .join("*")
        };

        let n_str = fmt(num);
        let d_str = fmt(den);
        if d_str == "1" { n_str } else { format!("{}/{}", n_str, d_str) }
    }
}

/// Canonical spelling of a unit name. Names that are not unit expressions
/// (e.g. free text) are compared verbatim.
pub fn canonical(unit: &Unit) -> String {
    ParsedUnit::parse(&unit.name).map_or_else(|| unit.name.trim().to_string(), |u| u.canonical())
}

/// Two columns may be compared or combined if their units agree or at least
/// one of them carries no unit.
pub fn compatible(a: Option<&Unit>, b: Option<&Unit>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => canonical(a) == canonical(b),
        _ => true,
    }
}

/// Whether a column may be used as the value of an aggregation.
pub fn aggregatable(unit: Option<&Unit>) -> bool {
    !unit.is_some_and(|u| u.comparison_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("USD", "USD")]
    #[case("m/s", "m/s")]
    #[case("m*m", "m^2")]
    #[case("s*m", "m*s")]
    #[case("m^2/m", "m")]
    #[case("1", "1")]
    fn test_parse_valid(#[case] input: &str, #[case] expected: &str) {
        let u = ParsedUnit::parse(input).expect("Failed to parse");
        assert_eq!(u.canonical(), expected, "Input: {}", input);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("USD//MWh")]
    #[case("USD^bar")]
    fn test_parse_invalid(#[case] input: &str) {
        assert!(ParsedUnit::parse(input).is_none(), "Should fail: '{}'", input);
    }

    #[rstest]
    #[case(Some("m*s"), Some("s*m"), true)]
    #[case(Some("year, comparison only"), Some("year"), true)]
    #[case(Some("USD"), Some("EUR"), false)]
    #[case(Some("USD"), None, true)]
    #[case(None, None, true)]
    fn test_compatible(#[case] a: Option<&str>, #[case] b: Option<&str>, #[case] expected: bool) {
        let a = a.map(Unit::parse);
        let b = b.map(Unit::parse);
        assert_eq!(compatible(a.as_ref(), b.as_ref()), expected);
    }

    #[test]
    fn test_comparison_only_is_not_aggregatable() {
        assert!(!aggregatable(Some(&Unit::parse("day, comparison only"))));
        assert!(aggregatable(Some(&Unit::parse("day"))));
        assert!(aggregatable(None));
    }
}
