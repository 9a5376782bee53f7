//! Inline route parameter constraints: `{id:int}`, `{key:guid}`, ...

/// Constraint attached to a `{name:constraint}` route segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Int,
    Long,
    Guid,
    Bool,
    Decimal,
    Double,
    Alpha,
    /// Unrecognized constraint name; accepts any value
    Unknown(String),
}

impl Constraint {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" => Constraint::Int,
            "long" => Constraint::Long,
            "guid" | "uuid" => Constraint::Guid,
            "bool" => Constraint::Bool,
            "decimal" => Constraint::Decimal,
            "double" | "float" => Constraint::Double,
            "alpha" => Constraint::Alpha,
            _ => Constraint::Unknown(name.to_string()),
        }
    }

    /// Check whether a raw path segment satisfies this constraint.
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Constraint::Int => value.parse::<i32>().is_ok(),
            Constraint::Long => value.parse::<i64>().is_ok(),
            Constraint::Guid => uuid::Uuid::parse_str(value).is_ok(),
            Constraint::Bool => {
                value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
            }
            Constraint::Decimal => {
                // Plain positional notation only, no exponent
                !value.contains(['e', 'E'])
                    && value.parse::<f64>().map(f64::is_finite).unwrap_or(false)
            }
            Constraint::Double => value.parse::<f64>().map(f64::is_finite).unwrap_or(false),
            Constraint::Alpha => !value.is_empty() && value.chars().all(|c| c.is_ascii_alphabetic()),
            Constraint::Unknown(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_constraint() {
        assert_eq!(Constraint::parse("int"), Constraint::Int);
        assert_eq!(Constraint::parse("INT"), Constraint::Int);
        assert_eq!(Constraint::parse("guid"), Constraint::Guid);
        assert_eq!(
            Constraint::parse("minlength(3)"),
            Constraint::Unknown("minlength(3)".to_string())
        );
    }

    #[test]
    fn test_numeric_constraints() {
        assert!(Constraint::Int.accepts("42"));
        assert!(Constraint::Int.accepts("-7"));
        assert!(!Constraint::Int.accepts("abc"));
        assert!(!Constraint::Int.accepts("3000000000"));
        assert!(Constraint::Long.accepts("3000000000"));
        assert!(Constraint::Decimal.accepts("12.50"));
        assert!(!Constraint::Decimal.accepts("1e5"));
        assert!(!Constraint::Decimal.accepts("NaN"));
        assert!(Constraint::Double.accepts("1e5"));
        assert!(!Constraint::Double.accepts("inf"));
    }

    #[test]
    fn test_other_constraints() {
        assert!(Constraint::Guid.accepts("67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(!Constraint::Guid.accepts("not-a-guid"));
        assert!(Constraint::Bool.accepts("TRUE"));
        assert!(!Constraint::Bool.accepts("yes"));
        assert!(Constraint::Alpha.accepts("abcXYZ"));
        assert!(!Constraint::Alpha.accepts("abc1"));
        assert!(!Constraint::Alpha.accepts(""));
        assert!(Constraint::Unknown("x".to_string()).accepts("anything"));
    }
}
