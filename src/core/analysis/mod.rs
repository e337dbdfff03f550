//! Market analyzers.
//!
//! Every analyzer follows the same contract: one transaction per pass,
//! batch latest-per-token queries, deduplication against active alerts of
//! its own kind, and savepoint-guarded inserts so a losing race surfaces as
//! "already created" instead of poisoning the pass.

pub mod cross;
pub mod intra;
pub mod pricing;
pub mod pullback;
pub mod spread;
pub mod volume;

use async_trait::async_trait;
use tracing::{error, info};

use crate::core::store::Store;
use crate::error::{Error, Result};

pub use cross::CrossMarketArbitrage;
pub use intra::IntraMarketArbitrage;
pub use pricing::{market_prices, Side, SidePrice};
pub use pullback::PullbackAnalyzer;
pub use spread::SpreadAnalyzer;
pub use volume::VolumeAnalyzer;

/// One analyzer pass over the store.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the pass; returns the number of alerts created.
    async fn analyze(&self, store: &Store) -> Result<usize>;
}

/// Run analyzers in parallel, each with its own store session.
///
/// Failures are isolated per analyzer: one failing pass is reported but the
/// others still commit.
pub async fn run_all(
    store: &Store,
    analyzers: Vec<Box<dyn Analyzer>>,
) -> Vec<(&'static str, Result<usize>)> {
    let tasks: Vec<_> = analyzers
        .into_iter()
        .map(|analyzer| {
            let store = store.clone();
            let name = analyzer.name();
            let handle =
                tokio::spawn(async move { analyzer.analyze(&store).await });
            (name, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(tasks.len());
    for (name, handle) in tasks {
        let joined = handle.await;
        let result = match joined {
            Ok(result) => result,
            Err(join_err) => Err(Error::Analysis(format!("{name} panicked: {join_err}"))),
        };
        match &result {
            Ok(count) => info!(analyzer = name, alerts = count, "Analyzer finished"),
            Err(err) => error!(analyzer = name, error = %err, "Analyzer failed"),
        }
        results.push((name, result));
    }
    results
}

/// The standard set of five analyzers with the given thresholds.
#[must_use]
pub fn standard_analyzers(
    volume_spike_threshold: f64,
    spread_alert_threshold: f64,
    arbitrage_min_profit: f64,
    arb_min_liquidity: f64,
) -> Vec<Box<dyn Analyzer>> {
    vec![
        Box::new(VolumeAnalyzer::new(volume_spike_threshold)),
        Box::new(SpreadAnalyzer::new(spread_alert_threshold)),
        Box::new(PullbackAnalyzer::default()),
        Box::new(IntraMarketArbitrage::new(arbitrage_min_profit)),
        Box::new(CrossMarketArbitrage::new(
            arbitrage_min_profit,
            arb_min_liquidity,
        )),
    ]
}

// A tokio runtime is needed for run_all; analyzer-specific behavior is
// tested in each analyzer's module.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::testkit::memory_store;

    struct Fixed(Result<usize>);

    #[async_trait]
    impl Analyzer for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn analyze(&self, _store: &Store) -> Result<usize> {
            match &self.0 {
                Ok(n) => Ok(*n),
                Err(_) => Err(Error::Analysis("boom".into())),
            }
        }
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let store = memory_store();
        let results = run_all(
            &store,
            vec![
                Box::new(Fixed(Ok(2))),
                Box::new(Fixed(Err(Error::Analysis("boom".into())))),
                Box::new(Fixed(Ok(1))),
            ],
        )
        .await;

        assert_eq!(results.len(), 3);
        assert_eq!(*results[0].1.as_ref().unwrap(), 2);
        assert!(results[1].1.is_err());
        assert_eq!(*results[2].1.as_ref().unwrap(), 1);
    }
}
