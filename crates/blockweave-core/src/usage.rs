//! Token and image usage accounting.
//!
//! Every generation task returns a [`Usage`] value; totals are produced by
//! folding those values once the tasks have settled.

use std::{
    iter::Sum,
    ops::{Add, AddAssign},
};

use serde::{Deserialize, Serialize};

use crate::config::PricingConfig;

/// Usage accumulated by one or more gateway calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Summed cost of generated images.
    pub image_cost: f64,
}

impl Usage {
    /// Usage of a single completion call.
    #[must_use]
    pub fn tokens(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            image_cost: 0.0,
        }
    }

    /// Usage of a single image call.
    #[must_use]
    pub fn image(cost: f64) -> Self {
        Self {
            image_cost: cost,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0 && self.image_cost == 0.0
    }

    /// Price the token usage with the configured per-million rates.
    #[must_use]
    pub fn price(&self, pricing: &PricingConfig) -> CostReport {
        let input_cost = self.prompt_tokens as f64 * pricing.input_per_million / 1_000_000.0;
        let output_cost =
            self.completion_tokens as f64 * pricing.output_per_million / 1_000_000.0;

        CostReport {
            usage: *self,
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost + self.image_cost,
        }
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
            image_cost: self.image_cost + rhs.image_cost,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Usage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a Usage> for Usage {
    fn sum<I: Iterator<Item = &'a Usage>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Usage totals together with their priced cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    #[serde(flatten)]
    pub usage: Usage,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_sum() {
        let parts = vec![
            Usage::tokens(100, 50),
            Usage::image(0.04),
            Usage::tokens(10, 5),
            Usage::image(0.0),
        ];

        let total: Usage = parts.iter().sum();

        assert_eq!(total.prompt_tokens, 110);
        assert_eq!(total.completion_tokens, 55);
        assert_eq!(total.total_tokens, 165);
        assert!((total.image_cost - 0.04).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_sum_is_default() {
        let total: Usage = Vec::<Usage>::new().into_iter().sum();
        assert!(total.is_empty());
    }

    #[test]
    fn test_price() {
        let pricing = PricingConfig {
            input_per_million: 1.0,
            output_per_million: 2.0,
        };
        let mut usage = Usage::tokens(1_000_000, 500_000);
        usage += Usage::image(0.5);

        let report = usage.price(&pricing);

        assert!((report.input_cost - 1.0).abs() < 1e-9);
        assert!((report.output_cost - 1.0).abs() < 1e-9);
        assert!((report.total_cost - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_serialized_field_names() {
        let value = serde_json::to_value(Usage::tokens(1, 2)).unwrap();
        assert_eq!(value["promptTokens"], 1);
        assert_eq!(value["completionTokens"], 2);
        assert_eq!(value["totalTokens"], 3);
    }
}
