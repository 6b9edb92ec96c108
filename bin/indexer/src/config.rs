//! Command-line options and the runtime `Config` derived from them
//! (spec "Configuration & CLI"), following the `Opts`/`Config` split
//! used by `sidecar/src/config/mod.rs`.

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use indexer_consensus::ConsensusConfig;
use indexer_ingestion::{ConsensusKind, FetcherConfig, OptimizerConfig};
use reqwest::Url;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "indexer", about = "WBFT EVM blockchain indexer")]
pub struct Opts {
    /// Upstream JSON-RPC HTTP endpoint.
    #[arg(long, env = "INDEXER_RPC_URL")]
    pub rpc_url: Url,
    /// Chain id the endpoint serves.
    #[arg(long, env = "INDEXER_CHAIN_ID", default_value_t = 1)]
    pub chain_id: u64,
    /// First height to ingest if no progress has been persisted yet.
    #[arg(long, env = "INDEXER_START_HEIGHT", default_value_t = 0)]
    pub start_height: u64,
    /// Whether the chain runs WBFT consensus (enables the decoder/BLS
    /// verifier pipeline). Pass `--no-wbft` for non-WBFT chains.
    #[arg(long, env = "INDEXER_WBFT", default_value_t = true)]
    pub wbft: bool,
    /// WBFT epoch length in blocks.
    #[arg(long, env = "INDEXER_EPOCH_LENGTH", default_value_t = 30_000)]
    pub epoch_length: u64,
    /// Minimum committed-seal participation percentage for quorum.
    #[arg(long, env = "INDEXER_MIN_PARTICIPATION_PCT", default_value_t = 66.67)]
    pub min_participation_pct: f64,
    /// Skip BLS signature verification (quorum decision from bitmap only).
    #[arg(long, env = "INDEXER_SKIP_BLS_VERIFICATION", default_value_t = false)]
    pub skip_bls_verification: bool,
    /// Minimum ingestion worker count.
    #[arg(long, env = "INDEXER_MIN_WORKERS", default_value_t = 1)]
    pub min_workers: usize,
    /// Maximum ingestion worker count.
    #[arg(long, env = "INDEXER_MAX_WORKERS", default_value_t = 32)]
    pub max_workers: usize,
    /// Prometheus `/metrics` HTTP listener port.
    #[arg(long, env = "INDEXER_METRICS_PORT", default_value_t = 9300)]
    pub metrics_port: u16,
    /// Log level passed to `tracing_subscriber`'s `EnvFilter`.
    #[arg(long, env = "INDEXER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the ingestion pipeline continuously, with startup gap recovery.
    Run,
    /// Detect (without repairing) block and receipt gaps in `[lo, hi]`.
    DetectGaps { lo: u64, hi: u64 },
    /// Detect and repair block and receipt gaps in `[lo, hi]`.
    FillGaps { lo: u64, hi: u64 },
}

/// Validated runtime configuration consumed by every subsystem
/// constructor (spec "Configuration & CLI").
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: Url,
    pub chain_id: u64,
    pub start_height: u64,
    pub fetcher: FetcherConfig,
    pub metrics_port: u16,
    pub log_level: String,
    pub command: Command,
}

impl Config {
    pub fn parse_from_cli() -> eyre::Result<Self> {
        Self::try_from(Opts::parse())
    }
}

impl TryFrom<Opts> for Config {
    type Error = eyre::Report;

    fn try_from(opts: Opts) -> Result<Self, Self::Error> {
        let fetcher = FetcherConfig {
            chain_id: opts.chain_id,
            consensus: if opts.wbft { ConsensusKind::Wbft } else { ConsensusKind::None },
            consensus_config: ConsensusConfig {
                epoch_length: opts.epoch_length,
                min_participation_pct: opts.min_participation_pct,
                skip_verification: opts.skip_bls_verification,
            },
            optimizer: OptimizerConfig {
                min_workers: opts.min_workers,
                max_workers: opts.max_workers,
                ..OptimizerConfig::default()
            },
            initial_workers: opts.min_workers.max(1),
            ..FetcherConfig::default()
        };

        Ok(Self {
            rpc_url: opts.rpc_url,
            chain_id: opts.chain_id,
            start_height: opts.start_height,
            fetcher,
            metrics_port: opts.metrics_port,
            log_level: opts.log_level,
            command: opts.command,
        })
    }
}

/// Watched-chain-wide quorum default, exposed for the `detect-gaps` and
/// `fill-gaps` subcommands which don't build a full `FetcherConfig`.
pub fn default_repair_config() -> indexer_gap::RepairConfig {
    indexer_gap::RepairConfig { workers: 8, max_retries: 5, retry_delay: Duration::from_millis(200) }
}

/// Placeholder zero address used where the spec leaves fee-payer
/// extraction to a chain-specific adapter (spec §9 Open Questions) that
/// this binary does not implement.
pub const ZERO_ADDRESS: Address = Address::ZERO;
