//! Literal values recorded for bound variables

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value bound to a variable by a declaration or assignment step
///
/// Only literal-resolvable right-hand sides produce concrete values. Anything
/// the extractor would have to execute is kept as `Opaque`, holding the
/// rendered source of the expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Val {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Opaque(String),
}

impl Val {
    /// Whether the value is known at extraction time
    pub fn is_literal(&self) -> bool {
        !matches!(self, Val::Opaque(_))
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Val::Num(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Undefined => write!(f, "undefined"),
            Val::Null => write!(f, "null"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Num(n) => write!(f, "{}", format_num(*n)),
            Val::Str(s) => write!(f, "{}", s),
            Val::Opaque(src) => write!(f, "{}", src),
        }
    }
}

/// Format a number the way a script console would (`4` rather than `4.0`)
pub fn format_num(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_integral_numbers_without_fraction() {
        assert_eq!(Val::Num(4.0).to_string(), "4");
        assert_eq!(Val::Num(-12.0).to_string(), "-12");
        assert_eq!(Val::Num(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_opaque_is_not_literal() {
        assert!(Val::Str("a".to_string()).is_literal());
        assert!(!Val::Opaque("fetch(url)".to_string()).is_literal());
    }
}
