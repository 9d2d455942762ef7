//! Request cost model.
//!
//! The limiter itself is cost-agnostic. The cost of a request is the base cost
//! of its HTTP method multiplied by every path-fragment factor it matches.

use std::collections::BTreeMap;

use crate::config::RateLimitConfig;

const DEFAULT_COST: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct CostModel {
    method_costs: BTreeMap<String, f64>,
    path_factors: BTreeMap<String, f64>,
}

impl CostModel {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            method_costs: config
                .operations_costs
                .iter()
                .map(|(method, cost)| (method.to_ascii_uppercase(), *cost))
                .collect(),
            path_factors: config.operations_costs_factors.clone(),
        }
    }

    /// Tokens charged for `method` on `path`. Unknown methods cost 1.
    pub fn cost(&self, method: &str, path: &str) -> f64 {
        let base = self
            .method_costs
            .get(&method.to_ascii_uppercase())
            .copied()
            .unwrap_or(DEFAULT_COST);

        self.path_factors
            .iter()
            .filter(|(fragment, _)| !fragment.is_empty() && path.contains(fragment.as_str()))
            .fold(base, |cost, (_, factor)| cost * factor)
    }
}
