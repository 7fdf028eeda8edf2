//! Macro for implementing stable label conversions on closed enums
//!
//! Error kinds, proxy types and circuit states all need the same trio: a
//! `&'static str` label used in metrics and logs, `Display`, and a
//! case-insensitive `FromStr`. The macro also emits an `ALL` constant
//! listing every variant in declaration order.
//!
//! # Example
//!
//! ```rust
//! use scrapeshield_domain::impl_label_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Strategy {
//!     Sequential,
//!     Random,
//! }
//!
//! impl_label_conversions!(Strategy {
//!     Sequential => "sequential",
//!     Random => "random",
//! });
//!
//! assert_eq!(Strategy::Random.as_str(), "random");
//! assert_eq!("SEQUENTIAL".parse::<Strategy>().unwrap(), Strategy::Sequential);
//! assert_eq!(Strategy::ALL.len(), 2);
//! ```

/// Implements `as_str`, `ALL`, `Display` and `FromStr` for label enums
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their labels
///
/// Parsing ignores ASCII case; output always uses the declared label.
#[macro_export]
macro_rules! impl_label_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Every variant in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable label used in logs, metrics and persisted data.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($str) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!("Invalid {}: {}", stringify!($enum_name), s))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestLabel {
        Alpha,
        BetaGamma,
    }

    impl_label_conversions!(TestLabel {
        Alpha => "ALPHA",
        BetaGamma => "BETA_GAMMA",
    });

    #[test]
    fn test_display_uses_declared_label() {
        assert_eq!(TestLabel::Alpha.to_string(), "ALPHA");
        assert_eq!(TestLabel::BetaGamma.to_string(), "BETA_GAMMA");
    }

    #[test]
    fn test_fromstr_ignores_case_and_whitespace() {
        assert_eq!(TestLabel::from_str("beta_gamma").unwrap(), TestLabel::BetaGamma);
        assert_eq!(TestLabel::from_str("  Alpha ").unwrap(), TestLabel::Alpha);
    }

    #[test]
    fn test_fromstr_invalid() {
        let result = TestLabel::from_str("delta");
        assert!(result.unwrap_err().contains("Invalid TestLabel: delta"));
    }

    #[test]
    fn test_all_lists_variants_in_order() {
        assert_eq!(TestLabel::ALL, &[TestLabel::Alpha, TestLabel::BetaGamma]);
    }
}
