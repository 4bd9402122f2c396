//! Minimal physical-unit algebra used when multiplying two mnemonics.
//!
//! Units are kept as products of symbols raised to integer powers, so
//! `"V" * "A"` composes to `"V A"` and `"m s-1" * "s"` to `"m"`. No attempt is
//! made to reduce to named derived units.

use crate::error::{EngdbError, EngdbResult};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::ops::Mul;
use std::str::FromStr;

lazy_static! {
    static ref TERM: Regex = Regex::new(r"^([A-Za-z%]+)(?:\^|\*\*)?(-?\d+)?$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Unit {
    terms: Vec<(String, i32)>,
}

impl Unit {
    pub fn dimensionless() -> Self {
        Self::default()
    }

    pub fn is_dimensionless(&self) -> bool {
        self.terms.is_empty()
    }

    fn accumulate(&mut self, symbol: &str, power: i32) {
        match self.terms.iter_mut().find(|(s, _)| s == symbol) {
            Some((_, existing)) => *existing += power,
            None => self.terms.push((symbol.to_string(), power)),
        }
        self.terms.retain(|(_, p)| *p != 0);
    }
}

impl FromStr for Unit {
    type Err = EngdbError;

    fn from_str(text: &str) -> EngdbResult<Self> {
        let mut unit = Unit::dimensionless();

        for (part_idx, part) in text.split('/').enumerate() {
            // Everything after the first slash is a denominator
            let sign = if part_idx == 0 { 1 } else { -1 };
            let tokens = part
                .split(|c: char| c.is_whitespace() || c == '.' || (c == '*' && !part.contains("**")))
                .filter(|t| !t.is_empty());

            for token in tokens {
                if token == "1" {
                    continue;
                }
                let captures = TERM.captures(token).ok_or_else(|| {
                    EngdbError::validation(format!("Unrecognized unit term '{}' in '{}'", token, text))
                })?;
                let power = match captures.get(2) {
                    Some(p) => p.as_str().parse::<i32>().map_err(|_| {
                        EngdbError::validation(format!("Bad exponent in unit '{}'", text))
                    })?,
                    None => 1,
                };
                unit.accumulate(&captures[1], sign * power);
            }
        }

        Ok(unit)
    }
}

impl Mul for Unit {
    type Output = Unit;

    fn mul(mut self, rhs: Unit) -> Unit {
        for (symbol, power) in rhs.terms {
            self.accumulate(&symbol, power);
        }
        self
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .terms
            .iter()
            .map(|(symbol, power)| match power {
                1 => symbol.clone(),
                p => format!("{}{}", symbol, p),
            })
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}

/// Compose two unit strings multiplicatively. `None` when either side is
/// not a recognizable unit.
pub fn compose_units(first: &str, second: &str) -> Option<String> {
    let first: Unit = first.parse().ok()?;
    let second: Unit = second.parse().ok()?;
    Some((first * second).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let unit: Unit = "m s-1".parse().unwrap();
        assert_eq!(unit.to_string(), "m s-1");

        let unit: Unit = "m/s".parse().unwrap();
        assert_eq!(unit.to_string(), "m s-1");

        let unit: Unit = "DN/s".parse().unwrap();
        assert_eq!(unit.to_string(), "DN s-1");

        let unit: Unit = "m**2".parse().unwrap();
        assert_eq!(unit.to_string(), "m2");

        let unit: Unit = "".parse().unwrap();
        assert!(unit.is_dimensionless());
    }

    #[test]
    fn test_compose() {
        assert_eq!(compose_units("m", "s").as_deref(), Some("m s"));
        assert_eq!(compose_units("V", "A").as_deref(), Some("V A"));
        assert_eq!(compose_units("m s-1", "s").as_deref(), Some("m"));
        assert_eq!(compose_units("m", "m").as_deref(), Some("m2"));
        assert_eq!(compose_units("1/s", "s").as_deref(), Some(""));
    }

    #[test]
    fn test_unrecognized_unit() {
        assert!("deg C (approx)".parse::<Unit>().is_err());
        assert_eq!(compose_units("m", "#$@"), None);
    }
}
