//! Run coordination: each selected supplier is fetched, parsed and
//! reconciled in sequence, then every product whose offers changed is
//! pushed downstream exactly once.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::{CatalogStore, CoefficientSource};
use crate::feed::fetch::{FeedFetcher, FeedSource, FetchError};
use crate::feed::parse::parse_feed;
use crate::model::{ImportMode, ImportRunStats, SyncRunStats};
use crate::pricing::CoefficientResolver;
use crate::reconcile::{engine, GuardStop, ResourceGuard};
use crate::suppliers::descriptor::FeedDescriptor;
use crate::suppliers::registry::SupplierRegistry;
use crate::suppliers::SupplierKey;
use crate::sync::{sync_products, RateLimiter, SyncTransport};
use crate::util::env::env_parse;

/// How one supplier's leg of the run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        stats: ImportRunStats,
        stopped: Option<GuardStop>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl RunOutcome {
    pub fn status_label(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "ok",
            RunOutcome::Skipped { .. } => "skipped",
            RunOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

#[derive(Debug)]
pub struct SupplierReport {
    pub key: SupplierKey,
    pub outcome: RunOutcome,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub reports: Vec<SupplierReport>,
    /// Product ids whose offer collections changed, sorted.
    pub changed: Vec<i64>,
    pub sync: Option<SyncRunStats>,
}

impl RunSummary {
    pub fn totals(&self) -> ImportRunStats {
        let mut totals = ImportRunStats::default();
        for report in &self.reports {
            if let RunOutcome::Completed { stats, .. } = &report.outcome {
                totals.merge(stats);
            }
        }
        totals
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: ImportMode,
    pub row_limit: Option<usize>,
    pub sleep_between: Duration,
    pub sync_enabled: bool,
}

impl RunOptions {
    pub fn from_env(mode: ImportMode) -> Self {
        Self {
            mode,
            row_limit: None,
            sleep_between: Duration::from_secs(env_parse("IMPORT_SUPPLIER_SLEEP_SECS", 5)),
            sync_enabled: true,
        }
    }
}

pub struct Orchestrator<'a, S, T> {
    store: &'a S,
    transport: &'a T,
    registry: SupplierRegistry,
    fetcher: FeedFetcher,
    limiter: RateLimiter,
    source_overrides: BTreeMap<SupplierKey, FeedSource>,
}

impl<'a, S, T> Orchestrator<'a, S, T>
where
    S: CatalogStore + CoefficientSource,
    T: SyncTransport,
{
    pub fn new(
        store: &'a S,
        transport: &'a T,
        registry: SupplierRegistry,
        fetcher: FeedFetcher,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            store,
            transport,
            registry,
            fetcher,
            limiter,
            source_overrides: BTreeMap::new(),
        }
    }

    /// Pins a supplier to a fixed source instead of its environment lookup.
    pub fn with_source(mut self, key: SupplierKey, source: FeedSource) -> Self {
        self.source_overrides.insert(key, source);
        self
    }

    /// Runs the given suppliers in order, then syncs the union of changed
    /// products downstream once.
    pub async fn run_all(&self, keys: &[SupplierKey], options: &RunOptions) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            %run_id,
            suppliers = keys.len(),
            mode = options.mode.label(),
            "import run start"
        );

        // a broken coefficient table would misprice every supplier, so the
        // whole run aborts instead
        let coefficients = self
            .store
            .list_all()
            .await
            .context("loading coefficient table")?;
        let resolver = CoefficientResolver::new(coefficients);

        let mut changed: HashSet<i64> = HashSet::new();
        let mut reports = Vec::with_capacity(keys.len());

        for (index, key) in keys.iter().enumerate() {
            if index > 0 {
                resolver.invalidate();
                if options.sleep_between > Duration::ZERO {
                    tokio::time::sleep(options.sleep_between).await;
                }
            }
            let supplier_started = Instant::now();
            let outcome = self
                .run_supplier(*key, &resolver, options, &mut changed)
                .await;
            reports.push(SupplierReport {
                key: *key,
                outcome,
                duration: supplier_started.elapsed(),
            });
        }

        for report in &reports {
            let elapsed_ms = report.duration.as_millis() as u64;
            match &report.outcome {
                RunOutcome::Completed { stats, stopped } => {
                    info!(
                        supplier = report.key.name(),
                        status = report.outcome.status_label(),
                        elapsed_ms,
                        %stats,
                        early_stop = stopped.as_ref().map(|s| s.to_string()).unwrap_or_default(),
                        "supplier finished"
                    );
                }
                RunOutcome::Skipped { reason } => {
                    warn!(
                        supplier = report.key.name(),
                        status = report.outcome.status_label(),
                        elapsed_ms,
                        reason = %reason,
                        "supplier skipped"
                    );
                }
                RunOutcome::Failed { error } => {
                    error!(
                        supplier = report.key.name(),
                        status = report.outcome.status_label(),
                        elapsed_ms,
                        error = %error,
                        "supplier failed"
                    );
                }
            }
        }

        let mut ids: Vec<i64> = changed.into_iter().collect();
        ids.sort_unstable();
        let sync = if options.sync_enabled && !ids.is_empty() {
            Some(
                sync_products(
                    self.store,
                    self.transport,
                    &self.registry,
                    &self.limiter,
                    &ids,
                )
                .await,
            )
        } else {
            if options.sync_enabled {
                info!("no offer collections changed, downstream sync not needed");
            }
            None
        };

        info!(
            %run_id,
            total_ms = started.elapsed().as_millis() as u64,
            changed = ids.len(),
            "import run complete"
        );
        Ok(RunSummary {
            run_id,
            reports,
            changed: ids,
            sync,
        })
    }

    /// Pushes the given product ids downstream without touching any feed.
    pub async fn sync_only(&self, ids: &[i64]) -> SyncRunStats {
        sync_products(self.store, self.transport, &self.registry, &self.limiter, ids).await
    }

    async fn run_supplier(
        &self,
        key: SupplierKey,
        resolver: &CoefficientResolver,
        options: &RunOptions,
        changed: &mut HashSet<i64>,
    ) -> RunOutcome {
        let Some(identity) = self.registry.identity(key).cloned() else {
            return RunOutcome::Failed {
                error: format!("supplier {key} missing from registry"),
            };
        };
        let descriptor = FeedDescriptor::for_supplier(key);

        let source = match self.source_overrides.get(&key) {
            Some(source) => source.clone(),
            None => match FeedSource::from_env(key, descriptor.transport) {
                Ok(source) => source,
                Err(error) => return classify_fetch_error(error),
            },
        };

        let bytes = match self.fetcher.fetch(key, &source).await {
            Ok(bytes) => bytes,
            Err(error) => return classify_fetch_error(error),
        };

        let parsed = parse_feed(&descriptor, &bytes, options.row_limit);
        if parsed.filtered > 0 {
            debug!(
                supplier = key.name(),
                filtered = parsed.filtered,
                "rows dropped by feed rules"
            );
        }
        if parsed.rows.is_empty() {
            // unreadable rows still surface as errors; a skip is reserved
            // for feeds with nothing to report at all
            if parsed.parse_errors > 0 {
                return RunOutcome::Completed {
                    stats: ImportRunStats {
                        errors: parsed.parse_errors,
                        ..ImportRunStats::default()
                    },
                    stopped: None,
                };
            }
            return RunOutcome::Skipped {
                reason: format!("no importable rows ({} filtered)", parsed.filtered),
            };
        }

        let guard = ResourceGuard::for_mode(options.mode);
        match engine::run(
            self.store,
            &identity,
            &descriptor,
            parsed.rows,
            resolver,
            options.mode,
            &guard,
            changed,
        )
        .await
        {
            Ok(report) => {
                // filtered rows stay out of the stats: skipped is for rows
                // that failed at the lookup or pricing stage
                let mut stats = report.stats;
                stats.errors += parsed.parse_errors;
                RunOutcome::Completed {
                    stats,
                    stopped: report.stopped,
                }
            }
            Err(error) => RunOutcome::Failed {
                error: error.to_string(),
            },
        }
    }
}

/// Config gaps and empty drops leave the catalog untouched and count as a
/// skip; everything else is a real failure.
fn classify_fetch_error(error: FetchError) -> RunOutcome {
    match &error {
        FetchError::MissingConfig(_) | FetchError::Unsupported { .. } | FetchError::Empty(_) => {
            RunOutcome::Skipped {
                reason: error.to_string(),
            }
        }
        _ => RunOutcome::Failed {
            error: error.to_string(),
        },
    }
}
