//! Token budget for a single context request

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Budget exceeded: {used} tokens used, {max} tokens allowed")]
    BudgetExceeded { used: usize, max: usize },

    #[error("Configuration invalid: budget must be positive")]
    ZeroBudget,
}

/// Maximum token cost of a context handed to the downstream model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    max_tokens: usize,
}

impl ContextBudget {
    pub fn new(max_tokens: usize) -> Result<Self, BudgetError> {
        if max_tokens == 0 {
            return Err(BudgetError::ZeroBudget);
        }
        Ok(Self { max_tokens })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Check if a given token count fits within the budget
    pub fn fits(&self, tokens: usize) -> bool {
        tokens <= self.max_tokens
    }

    pub fn check(&self, tokens: usize) -> Result<(), BudgetError> {
        if !self.fits(tokens) {
            return Err(BudgetError::BudgetExceeded {
                used: tokens,
                max: self.max_tokens,
            });
        }
        Ok(())
    }

    /// Tokens left after spending `used`
    pub fn remaining(&self, used: usize) -> usize {
        self.max_tokens.saturating_sub(used)
    }

    /// Budget left for the rest of the context once `reserved` tokens are
    /// spoken for. May be zero, in which case callers get best-effort output.
    pub fn reduced_by(&self, reserved: usize) -> usize {
        self.remaining(reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(ContextBudget::new(0), Err(BudgetError::ZeroBudget)));
    }

    #[test]
    fn test_check_budget() {
        let budget = ContextBudget::new(2000).unwrap();
        assert!(budget.check(2000).is_ok());
        assert!(matches!(
            budget.check(2001),
            Err(BudgetError::BudgetExceeded { used: 2001, max: 2000 })
        ));
    }

    #[test]
    fn test_reduced_budget_saturates() {
        let budget = ContextBudget::new(2000).unwrap();
        assert_eq!(budget.reduced_by(300), 1700);
        assert_eq!(budget.reduced_by(5000), 0);
    }
}
