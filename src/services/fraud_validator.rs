/// Outcome of comparing the charged amount against the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FraudCheck {
    Ok,
    Mismatch { expected: i64, charged: i64 },
}

impl FraudCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self, FraudCheck::Ok)
    }
}

/// Exact amount check in minor currency units. No tolerance.
#[derive(Debug, Clone, Copy, Default)]
pub struct FraudValidator;

impl FraudValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, expected_amount: i64, charged_amount: i64) -> FraudCheck {
        if expected_amount == charged_amount {
            FraudCheck::Ok
        } else {
            FraudCheck::Mismatch {
                expected: expected_amount,
                charged: charged_amount,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_passes() {
        assert!(FraudValidator::new().validate(500000, 500000).is_ok());
    }

    #[test]
    fn test_undercharge_is_mismatch() {
        assert_eq!(
            FraudValidator::new().validate(500000, 450000),
            FraudCheck::Mismatch {
                expected: 500000,
                charged: 450000
            }
        );
    }

    #[test]
    fn test_overcharge_by_one_unit_is_mismatch() {
        assert!(!FraudValidator::new().validate(500000, 500001).is_ok());
    }
}
