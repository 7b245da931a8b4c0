//! Measurement results.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Histogram of measured bitstrings.
///
/// Bitstrings put wire 0 rightmost: for two wires `"ba"`, `a` is wire 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counts {
    counts: FxHashMap<String, u64>,
}

impl Counts {
    /// Create an empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` observations of `bitstring`.
    pub fn insert(&mut self, bitstring: impl Into<String>, n: u64) {
        *self.counts.entry(bitstring.into()).or_insert(0) += n;
    }

    /// Observations of `bitstring` (zero if never seen).
    pub fn get(&self, bitstring: &str) -> u64 {
        self.counts.get(bitstring).copied().unwrap_or(0)
    }

    /// Total number of observations.
    pub fn total_shots(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct bitstrings.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over `(bitstring, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.counts.iter()
    }

    /// Most frequent outcome.
    pub fn most_frequent(&self) -> Option<(&String, u64)> {
        self.counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(k, v)| (k, *v))
    }

    /// Estimate of ⟨Z⟩ on `wire`: `(n₀ − n₁) / total`.
    ///
    /// Returns 0.0 for an empty histogram.
    pub fn expectation_z(&self, wire: usize) -> f64 {
        let total = self.total_shots();
        if total == 0 {
            return 0.0;
        }
        let mut signed: i64 = 0;
        for (bits, &n) in &self.counts {
            let one = bits.as_bytes().iter().rev().nth(wire) == Some(&b'1');
            let n = n as i64;
            signed += if one { -n } else { n };
        }
        signed as f64 / total as f64
    }
}

/// Result of a completed batch job: one histogram per submitted circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Histograms, in submission order.
    pub counts: Vec<Counts>,
    /// Shots per circuit.
    pub shots: u32,
    /// Wall-clock execution time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ExecutionResult {
    /// Create a result.
    pub fn new(counts: Vec<Counts>, shots: u32) -> Self {
        Self {
            counts,
            shots,
            execution_time_ms: None,
        }
    }

    /// Attach the execution time.
    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    /// Per-wire ⟨Z⟩ for every circuit.
    pub fn expectations_z(&self, num_wires: usize) -> Vec<Vec<f64>> {
        self.counts
            .iter()
            .map(|c| (0..num_wires).map(|w| c.expectation_z(w)).collect())
            .collect()
    }
}
