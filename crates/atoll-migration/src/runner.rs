//! In-process archipelago runner.
//!
//! Drives N islands as concurrent tasks over a shared [`MemoryFabric`],
//! polling both migration channels on a fixed generational cadence. The
//! evolutionary loop itself stays outside: callers implement [`Island`]
//! and the runner only ticks it and moves fragments.

use crate::emigration::Emigration;
use crate::immigration::Immigration;
use crate::memory::{MemoryFabric, MemoryPort};
use atoll_core::{AtollError, AtollResult, IslandId, Topology};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One island's evolutionary loop, as seen by the runner.
pub trait Island: Send {
    /// Advance the local population by one generation.
    fn advance(&mut self);

    /// Serialize a fragment of the local population into `buf`.
    /// Called immediately before a send is issued, never while one is
    /// outstanding.
    fn fill_fragment(&mut self, buf: &mut [u8]);

    /// Merge a just-arrived fragment into the local population. The slice
    /// is only valid for the duration of the call.
    fn absorb_fragment(&mut self, buf: &[u8]);
}

/// Configuration for an archipelago run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Generations to run on each island.
    pub generations: u64,
    /// Generations between migration polls.
    pub migration_interval: u64,
    /// Fixed fragment size in bytes, identical across the archipelago.
    pub fragment_size: usize,
    /// Base seed for peer selection. Each island offsets it by its own id,
    /// making runs reproducible. `None` seeds from entropy.
    pub migration_seed: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            generations: 100,
            migration_interval: 5,
            fragment_size: 64,
            migration_seed: None,
        }
    }
}

/// Per-island summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The island this report describes.
    pub island: IslandId,
    /// Generations executed.
    pub generations: u64,
    /// Fragments handed to the transport.
    pub fragments_sent: u64,
    /// Fragments delivered to the island.
    pub fragments_received: u64,
}

/// Runs a set of islands to completion with periodic migration.
pub struct ArchipelagoRunner<I: Island + 'static> {
    islands: Vec<I>,
    config: RunnerConfig,
}

impl<I: Island + 'static> ArchipelagoRunner<I> {
    /// Create a runner over the given islands.
    ///
    /// # Errors
    ///
    /// Rejects an empty island set, a zero fragment size, and a zero
    /// migration interval.
    pub fn new(islands: Vec<I>, config: RunnerConfig) -> AtollResult<Self> {
        if islands.is_empty() {
            return Err(AtollError::EmptyTopology);
        }
        if config.fragment_size == 0 {
            return Err(AtollError::ZeroFragmentSize);
        }
        if config.migration_interval == 0 {
            return Err(AtollError::Runner(
                "migration interval must be non-zero".to_string(),
            ));
        }
        Ok(Self { islands, config })
    }

    /// Island count in this archipelago.
    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    /// Runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run every island to completion. Returns each island's final state
    /// alongside its report, ordered by island id, so callers can read
    /// the evolved populations back out.
    ///
    /// A sole island runs without migration channels at all — the same
    /// rule the channels enforce at construction. With two or more
    /// islands, each gets its own task, port, and channel pair over one
    /// shared fabric; in-flight operations are cancelled when the
    /// generations are exhausted.
    pub async fn run(self) -> AtollResult<Vec<(I, RunReport)>> {
        let count = self.islands.len() as u32;
        let config = self.config;
        let mut islands = self.islands;

        if count == 1 {
            if let Some(mut island) = islands.pop() {
                for _ in 0..config.generations {
                    island.advance();
                }
                let report = RunReport {
                    island: IslandId::new(0),
                    generations: config.generations,
                    fragments_sent: 0,
                    fragments_received: 0,
                };
                return Ok(vec![(island, report)]);
            }
        }

        let fabric = MemoryFabric::new(count)?;
        let mut tasks = Vec::with_capacity(islands.len());
        for (i, island) in islands.into_iter().enumerate() {
            let id = IslandId::new(i as u32);
            let topology = Topology::new(count, id)?;
            let port = fabric.port(id)?;
            let immigration = Immigration::new(&topology, config.fragment_size)?;
            let emigration = match config.migration_seed {
                Some(seed) => {
                    Emigration::with_seed(topology, config.fragment_size, seed.wrapping_add(i as u64))?
                }
                None => Emigration::new(topology, config.fragment_size)?,
            };
            let config = config.clone();
            tasks.push(tokio::spawn(drive_island(
                id,
                island,
                port,
                immigration,
                emigration,
                config,
            )));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for joined in join_all(tasks).await {
            let outcome =
                joined.map_err(|e| AtollError::Runner(format!("island task failed: {e}")))??;
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|(_, report)| report.island);
        Ok(outcomes)
    }
}

async fn drive_island<I: Island>(
    id: IslandId,
    mut island: I,
    port: MemoryPort,
    mut immigration: Immigration,
    mut emigration: Emigration,
    config: RunnerConfig,
) -> AtollResult<(I, RunReport)> {
    for generation in 0..config.generations {
        island.advance();
        if generation % config.migration_interval == 0 {
            immigration.poll(&port, |buf| island.absorb_fragment(buf))?;
            emigration.poll(&port, |buf| island.fill_fragment(buf))?;
        }
        tokio::task::yield_now().await;
    }

    // One last immigration poll picks up a fragment that arrived after
    // the final migration generation, then both channels are drained.
    immigration.poll(&port, |buf| island.absorb_fragment(buf))?;
    immigration.shutdown(&port)?;
    emigration.shutdown(&port)?;

    let report = RunReport {
        island: id,
        generations: config.generations,
        fragments_sent: emigration.dispatched(),
        fragments_received: immigration.delivered(),
    };
    info!(
        "{} finished {} generations: sent {}, received {}",
        id, report.generations, report.fragments_sent, report.fragments_received
    );
    Ok((island, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal island: counts calls, emits its id, records arrivals.
    struct CountingIsland {
        id: u8,
        advanced: u64,
        absorbed: Vec<u8>,
    }

    impl CountingIsland {
        fn new(id: u8) -> Self {
            Self {
                id,
                advanced: 0,
                absorbed: Vec::new(),
            }
        }
    }

    impl Island for CountingIsland {
        fn advance(&mut self) {
            self.advanced += 1;
        }

        fn fill_fragment(&mut self, buf: &mut [u8]) {
            buf.fill(self.id);
        }

        fn absorb_fragment(&mut self, buf: &[u8]) {
            self.absorbed.push(buf[0]);
        }
    }

    #[test]
    fn test_empty_archipelago_rejected() {
        let islands: Vec<CountingIsland> = Vec::new();
        let err = ArchipelagoRunner::new(islands, RunnerConfig::default())
            .err()
            .unwrap();
        assert_eq!(err, AtollError::EmptyTopology);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = RunnerConfig {
            migration_interval: 0,
            ..Default::default()
        };
        let err = ArchipelagoRunner::new(vec![CountingIsland::new(0)], config)
            .err()
            .unwrap();
        assert!(matches!(err, AtollError::Runner(_)));
    }

    #[tokio::test]
    async fn test_sole_island_runs_without_migration() {
        let config = RunnerConfig {
            generations: 25,
            ..Default::default()
        };
        let runner = ArchipelagoRunner::new(vec![CountingIsland::new(0)], config).unwrap();
        let outcomes = runner.run().await.unwrap();

        assert_eq!(outcomes.len(), 1);
        let (island, report) = &outcomes[0];
        assert_eq!(island.advanced, 25);
        assert_eq!(report.generations, 25);
        assert_eq!(report.fragments_sent, 0);
        assert_eq!(report.fragments_received, 0);
    }

    #[tokio::test]
    async fn test_archipelago_migrates() {
        let config = RunnerConfig {
            generations: 60,
            migration_interval: 2,
            fragment_size: 8,
            migration_seed: Some(0xA70),
        };
        let islands: Vec<_> = (0..4).map(CountingIsland::new).collect();
        let runner = ArchipelagoRunner::new(islands, config).unwrap();
        let outcomes = runner.run().await.unwrap();

        assert_eq!(outcomes.len(), 4);
        for (i, (island, report)) in outcomes.iter().enumerate() {
            assert_eq!(report.island, IslandId::new(i as u32));
            assert_eq!(report.generations, 60);
            assert_eq!(island.advanced, 60);
            // 30 migration polls with instant delivery: the first arms or
            // dispatches, the rest keep the pipeline full.
            assert!(report.fragments_sent >= 1, "{} sent nothing", report.island);
            assert_eq!(island.absorbed.len() as u64, report.fragments_received);
        }
        let total_received: u64 = outcomes.iter().map(|(_, r)| r.fragments_received).sum();
        assert!(total_received >= 1, "no fragment crossed the archipelago");
    }

    #[tokio::test]
    async fn test_reports_sorted_by_island() {
        let config = RunnerConfig {
            generations: 10,
            migration_interval: 1,
            fragment_size: 4,
            migration_seed: Some(7),
        };
        let islands: Vec<_> = (0..3).map(CountingIsland::new).collect();
        let outcomes = ArchipelagoRunner::new(islands, config)
            .unwrap()
            .run()
            .await
            .unwrap();
        let ids: Vec<u32> = outcomes.iter().map(|(_, r)| r.island.as_u32()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
