//! Stochastic vehicle arrivals from a weighted demand matrix

use anyhow::Result;
use log::debug;
use rand::Rng;

use super::types::NodeId;

/// Largest rate sampled in one pass; `exp(-lambda)` underflows far beyond it
const MAX_LAMBDA_PER_DRAW: f64 = 500.0;

/// A weighted origin-destination pair
#[derive(Debug, Clone, PartialEq)]
pub struct DemandEntry {
    pub departure: NodeId,
    pub destination: NodeId,
    pub weight: f64,
}

/// A vehicle request produced by the generator for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    pub departure: NodeId,
    pub destination: NodeId,
}

/// Most arrivals one demand entry emits in a single tick
///
/// The first vehicle occupies the entry of its edge, so further arrivals of
/// the same entry within the tick are dropped anyway.
pub const MAX_ARRIVALS_PER_ENTRY: u32 = 32;

/// Samples a Poisson distributed count with mean `lambda`.
pub fn poisson<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u32 {
    poisson_capped(rng, lambda, u32::MAX)
}

/// Samples `min(X, cap)` for a Poisson distributed `X` with mean `lambda`.
///
/// Multiplies uniform draws until the running product falls below
/// `exp(-lambda)`; the number of draws minus one is the count. Rates above
/// `MAX_LAMBDA_PER_DRAW` are sampled in chunks, a sum of independent Poisson
/// draws being Poisson with the summed mean. Sampling stops at `cap`.
pub fn poisson_capped<R: Rng + ?Sized>(rng: &mut R, lambda: f64, cap: u32) -> u32 {
    if !(lambda > 0.0) {
        return 0;
    }
    if !lambda.is_finite() {
        return cap;
    }

    let mut remaining = lambda;
    let mut count: u32 = 0;
    while remaining > 0.0 && count < cap {
        let chunk = remaining.min(MAX_LAMBDA_PER_DRAW);
        remaining -= chunk;

        let limit = (-chunk).exp();
        let mut product: f64 = rng.random();
        while product >= limit && count < cap {
            count = count.saturating_add(1);
            product *= rng.random::<f64>();
        }
    }
    count
}

/// Demand matrix plus the global frequency scalar
#[derive(Debug, Clone, Default)]
pub struct TrafficGenerator {
    demand: Vec<DemandEntry>,
}

impl TrafficGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn demand(&self) -> &[DemandEntry] {
        &self.demand
    }

    /// Adds a demand entry, replacing the weight of an existing pair
    pub fn set_demand(&mut self, departure: NodeId, destination: NodeId, weight: f64) -> Result<()> {
        if departure == destination {
            anyhow::bail!("Demand departure and destination must differ");
        }
        if !(weight.is_finite() && weight >= 0.0) {
            anyhow::bail!("Demand weight must be finite and non-negative, got {}", weight);
        }

        match self
            .demand
            .iter_mut()
            .find(|e| e.departure == departure && e.destination == destination)
        {
            Some(entry) => entry.weight = weight,
            None => self.demand.push(DemandEntry {
                departure,
                destination,
                weight,
            }),
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.demand.clear();
    }

    /// Drops every entry that references the given node
    pub fn remove_node(&mut self, node: NodeId) {
        self.demand
            .retain(|e| e.departure != node && e.destination != node);
    }

    /// Expected arrivals of an entry during one tick
    pub fn arrival_rate(
        entry: &DemandEntry,
        frequency: f64,
        delta_secs: f64,
        site_count: usize,
    ) -> f64 {
        if site_count == 0 {
            return 0.0;
        }
        entry.weight * frequency * delta_secs / site_count as f64
    }

    /// Draws the arrivals of one tick for every demand entry, in entry order
    ///
    /// Each entry emits at most `MAX_ARRIVALS_PER_ENTRY` arrivals.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        frequency: f64,
        delta_secs: f64,
        site_count: usize,
    ) -> Vec<Arrival> {
        let mut arrivals = Vec::new();
        for entry in &self.demand {
            let lambda = Self::arrival_rate(entry, frequency, delta_secs, site_count);
            let count = poisson_capped(rng, lambda, MAX_ARRIVALS_PER_ENTRY);
            if count > 0 {
                debug!(
                    "{} arrivals from {:?} to {:?} (lambda {:.4})",
                    count, entry.departure, entry.destination, lambda
                );
            }
            for _ in 0..count {
                arrivals.push(Arrival {
                    departure: entry.departure,
                    destination: entry.destination,
                });
            }
        }
        arrivals
    }
}
