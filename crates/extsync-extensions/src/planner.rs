//! Update planning
//!
//! Turns the installed set into a list of [`ChangePlan`]s:
//! filter to the selection, collapse duplicate ids, resolve the latest
//! version of each item through a rate-limited [`TaskExecutor`], classify,
//! then validate the result before anything is executed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use extsync_core::types::{
    is_valid_extension_id, ChangePlan, EngineConfig, InstalledItem, RegistrySource, UnitOutcome,
    UnitStatus,
};
use extsync_core::{is_newer, OperationError};
use tracing::{debug, info, warn};

use crate::collaborators::RegistryClient;
use crate::error::{EngineError, Result};
use crate::pool::{Flow, TaskExecutor};

/// Knobs for the resolution phase
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    /// Registry lookups in flight at once
    pub concurrency: usize,

    /// Pause between consecutive lookups of one worker
    pub request_delay: Duration,

    pub prefer_prerelease: bool,

    pub preferred_source: RegistrySource,

    /// Try the other registry when the preferred one fails
    pub source_fallback: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            request_delay: Duration::from_millis(100),
            prefer_prerelease: false,
            preferred_source: RegistrySource::OpenVsx,
            source_fallback: true,
        }
    }
}

impl PlannerOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            concurrency: config.resolution.concurrency,
            request_delay: config.resolution.request_delay(),
            prefer_prerelease: config.resolution.prefer_prerelease,
            preferred_source: config.sources.preferred_for(config.editor),
            source_fallback: config.sources.fallback,
        }
    }

    fn sources(&self) -> Vec<RegistrySource> {
        self.preferred_source.preference_order(self.source_fallback)
    }
}

/// Result of planning one batch
#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    /// Items that must change
    pub plans: Vec<ChangePlan>,

    /// Items already at the latest version
    pub up_to_date: Vec<UnitOutcome>,

    /// Items whose latest version could not be resolved
    pub failed: Vec<UnitOutcome>,

    /// Distinct items considered after filtering and deduplication
    pub total_detected: usize,
}

impl UpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// What resolving one item produced
struct Resolution {
    latest: std::result::Result<(String, RegistrySource), OperationError>,
    elapsed_ms: u64,
}

/// Decides which installed items need to change and to what version
pub struct UpdatePlanner {
    registry: Arc<dyn RegistryClient>,
    options: PlannerOptions,
}

impl UpdatePlanner {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            registry,
            options: PlannerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PlannerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// Plan the batch
    ///
    /// When `selection` is given, only those ids are considered and each of
    /// them is planned even if the registry reports no newer version.
    pub async fn plan(
        &self,
        installed: Vec<InstalledItem>,
        selection: Option<&[String]>,
    ) -> Result<UpdatePlan> {
        let candidates = match selection {
            Some(ids) => filter_selection(installed, ids),
            None => installed,
        };
        let items = dedupe(candidates);
        let forced = selection.is_some();

        info!(
            items = items.len(),
            forced,
            concurrency = self.options.concurrency,
            "resolving latest versions"
        );

        let executor = TaskExecutor::new(self.options.concurrency)
            .with_request_delay(self.options.request_delay);
        let report = executor
            .run(&items, |_, item| async move {
                (self.resolve(item).await, Flow::Continue)
            })
            .await;
        let resolutions = report.into_ordered();

        let mut plan = UpdatePlan {
            total_detected: items.len(),
            ..Default::default()
        };

        for (item, resolution) in items.into_iter().zip(resolutions) {
            match resolution.latest {
                Err(err) => {
                    debug!(id = %item.id, error = %err, "could not resolve latest version");
                    plan.failed.push(
                        UnitOutcome::failed(&item.id, err.message)
                            .with_version(&item.version)
                            .with_elapsed_ms(resolution.elapsed_ms),
                    );
                }
                Ok((latest, source)) if forced || is_newer(&latest, &item.version) => {
                    debug!(
                        id = %item.id,
                        current = %item.version,
                        target = %latest,
                        %source,
                        forced,
                        "planned"
                    );
                    plan.plans.push(ChangePlan {
                        id: item.id,
                        current_version: item.version,
                        target_version: latest,
                        forced,
                        install_path: item.install_path,
                    });
                }
                Ok(_) => {
                    plan.up_to_date.push(
                        UnitOutcome::new(&item.id, UnitStatus::UpToDate)
                            .with_version(&item.version)
                            .with_elapsed_ms(resolution.elapsed_ms),
                    );
                }
            }
        }

        validate_plans(&plan.plans)?;

        info!(
            to_update = plan.plans.len(),
            up_to_date = plan.up_to_date.len(),
            failed = plan.failed.len(),
            "plan ready"
        );
        Ok(plan)
    }

    /// Ask each source in preference order; the last error wins
    async fn resolve(&self, item: &InstalledItem) -> Resolution {
        let started = Instant::now();
        let mut last_error =
            OperationError::not_found(format!("{} not found in any registry", item.id));

        for source in self.options.sources() {
            match self
                .registry
                .resolve_latest_version(&item.id, self.options.prefer_prerelease, source)
                .await
            {
                Ok(version) if !version.trim().is_empty() => {
                    return Resolution {
                        latest: Ok((version, source)),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    };
                }
                Ok(_) => {
                    last_error = OperationError::not_found(format!(
                        "{} has no published version on {}",
                        item.id, source
                    ));
                }
                Err(err) => {
                    debug!(id = %item.id, %source, error = %err, "resolution failed");
                    last_error = err;
                }
            }
        }

        Resolution {
            latest: Err(last_error),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Keep only selected ids (case-insensitive); unknown selections are logged
fn filter_selection(installed: Vec<InstalledItem>, selection: &[String]) -> Vec<InstalledItem> {
    let wanted: HashSet<String> = selection.iter().map(|id| id.to_lowercase()).collect();
    let present: HashSet<String> = installed.iter().map(|item| item.id.to_lowercase()).collect();

    for id in selection {
        if !present.contains(&id.to_lowercase()) {
            warn!(id = %id, "selected extension is not installed; ignoring");
        }
    }

    installed
        .into_iter()
        .filter(|item| wanted.contains(&item.id.to_lowercase()))
        .collect()
}

/// Collapse items sharing an id (case-insensitive) to the highest version
///
/// The surviving item keeps the position of the first occurrence; on a tie
/// the first one seen wins.
pub fn dedupe(items: Vec<InstalledItem>) -> Vec<InstalledItem> {
    let mut kept: Vec<InstalledItem> = Vec::with_capacity(items.len());

    for item in items {
        match kept.iter_mut().find(|k| k.id.eq_ignore_ascii_case(&item.id)) {
            Some(existing) => {
                if is_newer(&item.version, &existing.version) {
                    debug!(
                        id = %item.id,
                        dropped = %existing.version,
                        kept = %item.version,
                        "collapsing duplicate install"
                    );
                    *existing = item;
                }
            }
            None => kept.push(item),
        }
    }

    kept
}

/// Every plan must name a `publisher.name` id and a non-empty target
pub fn validate_plans(plans: &[ChangePlan]) -> Result<()> {
    for plan in plans {
        if !is_valid_extension_id(&plan.id) {
            return Err(EngineError::invalid_plan(
                &plan.id,
                "id does not match publisher.name",
            ));
        }
        if plan.target_version.trim().is_empty() {
            return Err(EngineError::invalid_plan(&plan.id, "target version is empty"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, version: &str) -> InstalledItem {
        InstalledItem::new(id, version)
    }

    #[test]
    fn test_dedupe_keeps_highest() {
        let out = dedupe(vec![item("pub.a", "1.0.0"), item("pub.a", "1.2.0")]);
        assert_eq!(out, vec![item("pub.a", "1.2.0")]);
    }

    #[test]
    fn test_dedupe_is_case_insensitive_and_keeps_first_on_tie() {
        let out = dedupe(vec![
            item("Pub.A", "1.0.0").with_install_path("/first"),
            item("pub.b", "0.1.0"),
            item("pub.a", "1.0.0").with_install_path("/second"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "Pub.A");
        assert_eq!(out[0].install_path.as_deref(), Some(std::path::Path::new("/first")));
        assert_eq!(out[1].id, "pub.b");
    }

    #[test]
    fn test_dedupe_replacement_keeps_position() {
        let out = dedupe(vec![
            item("pub.a", "1.0.0"),
            item("pub.b", "1.0.0"),
            item("pub.a", "2.0.0"),
        ]);
        assert_eq!(out, vec![item("pub.a", "2.0.0"), item("pub.b", "1.0.0")]);
    }

    #[test]
    fn test_filter_selection_case_insensitive() {
        let out = filter_selection(
            vec![item("Pub.A", "1.0.0"), item("pub.b", "1.0.0")],
            &["pub.a".to_string(), "pub.missing".to_string()],
        );
        assert_eq!(out, vec![item("Pub.A", "1.0.0")]);
    }

    #[test]
    fn test_validate_rejects_bad_id() {
        let plans = vec![ChangePlan {
            id: "nodot".into(),
            current_version: "1.0.0".into(),
            target_version: "2.0.0".into(),
            forced: false,
            install_path: None,
        }];
        let err = validate_plans(&plans).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPlan { ref id, .. } if id == "nodot"));
    }

    #[test]
    fn test_validate_rejects_empty_target() {
        let plans = vec![ChangePlan {
            id: "pub.a".into(),
            current_version: "1.0.0".into(),
            target_version: "  ".into(),
            forced: true,
            install_path: None,
        }];
        assert!(validate_plans(&plans).is_err());
        assert!(validate_plans(&[]).is_ok());
    }
}
