//! Reconciler: converges installed units to the declared enabled set.
//!
//! Every managed utility is either `ToEnable` (declared) or `ToDisable` (not
//! declared); utilities without unit definitions are never touched. Planning
//! queries live state and only schedules deltas, so a second run over an
//! unchanged host plans nothing.
//!
//! Execution runs in four phases:
//! 1. stop, disable and delete the units of every `ToDisable` utility
//! 2. provision config and write unit files for every `ToEnable` utility
//! 3. one daemon-reload, only if a unit file or enablement changed
//! 4. enable and start timers, then enable services (starting unpaired ones)

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogEntry};
use crate::desired::DesiredState;
use crate::installer::{self, RenderedUnit, UnitInstaller};
use crate::manager::{ServiceManager, UnitAction, query_or_sentinel};
use crate::plan::{
    ExecuteContext, ExecutionReport, Operation, OperationResult, Plan, PlanContext, PlanSummary,
    Plannable, Verb,
};
use crate::provision::{self, ProvisionOutcome};
use crate::settings::Settings;

/// Reconcile `catalog` against `desired`.
pub struct SyncCommand {
    pub desired: DesiredState,
    pub catalog: Catalog,
}

impl SyncCommand {
    pub fn new(desired: DesiredState, catalog: Catalog) -> Self {
        Self { desired, catalog }
    }

    /// Plan and execute in one step.
    pub fn run(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecutionReport> {
        let plan = self.plan(&PlanContext::new(ctx.settings(), ctx.manager()))?;
        plan.execute(ctx)
    }
}

/// Live-state step for one unit of a utility being enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStep {
    pub unit: String,
    pub enable: bool,
    pub start: bool,
    /// Timer that starts this service, if any.
    pub started_by: Option<String>,
}

impl UnitStep {
    fn is_noop(&self) -> bool {
        !self.enable && !self.start
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionStep {
    pub template: PathBuf,
    pub dest: PathBuf,
}

/// Everything needed to bring one declared utility up.
#[derive(Debug, Clone)]
pub struct Enablement {
    pub utility: String,
    pub provision: Option<ProvisionStep>,
    /// Unit files missing or out of date in the unit directory.
    pub writes: Vec<RenderedUnit>,
    pub timers: Vec<UnitStep>,
    pub services: Vec<UnitStep>,
}

impl Enablement {
    fn is_noop(&self) -> bool {
        self.provision.is_none()
            && self.writes.is_empty()
            && self.steps().all(UnitStep::is_noop)
    }

    fn steps(&self) -> impl Iterator<Item = &UnitStep> {
        self.timers.iter().chain(self.services.iter())
    }
}

/// Installed units of one undeclared utility.
#[derive(Debug, Clone)]
pub struct Removal {
    pub utility: String,
    pub units: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    removals: Vec<Removal>,
    enables: Vec<Enablement>,
    /// Declared but absent from the catalog.
    ignored: Vec<String>,
    /// Declared but without unit definitions.
    unmanaged: Vec<String>,
    unit_dir: PathBuf,
    install_root: PathBuf,
}

impl SyncPlan {
    pub fn removals(&self) -> &[Removal] {
        &self.removals
    }

    pub fn enables(&self) -> &[Enablement] {
        &self.enables
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    pub fn unmanaged(&self) -> &[String] {
        &self.unmanaged
    }

    /// Whether a unit file or an enablement changes.
    pub fn needs_reload(&self) -> bool {
        self.describe()
            .operations
            .iter()
            .any(|op| op.verb.needs_reload())
    }
}

impl Plannable for SyncCommand {
    type Plan = SyncPlan;

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Self::Plan> {
        let settings = ctx.settings();
        let mut plan = SyncPlan {
            unit_dir: settings.unit_dir.clone(),
            install_root: settings.install_root(),
            ..Default::default()
        };

        for name in self.desired.names() {
            match self.catalog.get(name) {
                None => {
                    warn!(utility = %name, "Declared utility not found; ignoring");
                    plan.ignored.push(name.to_string());
                }
                Some(entry) if !entry.has_units => {
                    debug!(utility = %name, "Declared utility has no units");
                    plan.unmanaged.push(name.to_string());
                }
                Some(_) => {}
            }
        }

        for entry in self.catalog.managed() {
            if self.desired.contains(&entry.name) {
                let enablement = plan_enablement(entry, settings, &plan.install_root, ctx.manager())
                    .with_context(|| format!("Failed to plan {}", entry.name))?;
                if !enablement.is_noop() {
                    plan.enables.push(enablement);
                }
            } else {
                let units = installed_units_of(entry, &settings.unit_dir)?;
                if !units.is_empty() {
                    plan.removals.push(Removal {
                        utility: entry.name.clone(),
                        units,
                    });
                }
            }
        }

        Ok(plan)
    }
}

fn plan_enablement(
    entry: &CatalogEntry,
    settings: &Settings,
    install_root: &Path,
    manager: &dyn ServiceManager,
) -> Result<Enablement> {
    let provision = entry.config_template.as_ref().and_then(|template| {
        let dest = settings.config_store_for(&entry.name);
        (!dest.exists()).then(|| ProvisionStep {
            template: template.clone(),
            dest,
        })
    });

    let installer = UnitInstaller::new(
        &settings.unit_dir,
        install_root,
        settings.config_dir_for(&entry.name),
    );
    let writes = installer.pending(entry)?;

    let timers = entry
        .timer_units
        .iter()
        .map(|timer| {
            let record = query_or_sentinel(manager, timer);
            UnitStep {
                unit: timer.clone(),
                enable: !record.is_enabled(),
                start: !record.is_active(),
                started_by: None,
            }
        })
        .collect();

    let services = entry
        .service_units
        .iter()
        .map(|service| {
            let record = query_or_sentinel(manager, service);
            let started_by = entry.timer_for(service).map(str::to_string);
            UnitStep {
                unit: service.clone(),
                enable: !record.is_enabled(),
                // A paired service is only ever started by its timer.
                start: started_by.is_none() && !record.is_active(),
                started_by,
            }
        })
        .collect();

    Ok(Enablement {
        utility: entry.name.clone(),
        provision,
        writes,
        timers,
        services,
    })
}

/// Installed files prefixed by the utility name, plus its own declared units.
fn installed_units_of(entry: &CatalogEntry, unit_dir: &Path) -> Result<Vec<String>> {
    let units = installer::installed_units(unit_dir, |name| {
        name.starts_with(entry.name.as_str()) || entry.declares_unit(name)
    })?;
    Ok(units)
}

impl Plan for SyncPlan {
    fn describe(&self) -> PlanSummary {
        let mut summary = PlanSummary::new(format!(
            "Sync: {} to enable, {} to disable",
            self.enables.len(),
            self.removals.len()
        ));

        for removal in &self.removals {
            for unit in &removal.units {
                summary.add_operation(Operation::new(Verb::Stop, unit));
                summary.add_operation(Operation::new(Verb::Disable, unit));
                summary.add_operation(Operation::new(Verb::Remove, unit));
            }
        }

        for enablement in &self.enables {
            if let Some(step) = &enablement.provision {
                summary.add_operation(Operation::with_details(
                    Verb::Provision,
                    &enablement.utility,
                    step.dest.display().to_string(),
                ));
            }
            for unit in &enablement.writes {
                summary.add_operation(Operation::with_details(
                    Verb::Install,
                    &unit.name,
                    self.unit_dir.join(&unit.name).display().to_string(),
                ));
            }
        }

        let reload = summary.operations.iter().any(|op| op.verb.needs_reload())
            || self
                .enables
                .iter()
                .flat_map(|enablement| enablement.steps())
                .any(|step| step.enable);
        if reload {
            summary.add_operation(Operation::new(Verb::Reload, "systemd"));
        }

        for enablement in &self.enables {
            for step in enablement.steps() {
                if step.enable {
                    summary.add_operation(Operation::new(Verb::Enable, &step.unit));
                }
                if step.start {
                    summary.add_operation(Operation::new(Verb::Start, &step.unit));
                } else if let Some(timer) = &step.started_by {
                    summary.add_operation(Operation::with_details(
                        Verb::Skip,
                        &step.unit,
                        format!("started by {timer}"),
                    ));
                }
            }
        }

        for name in &self.ignored {
            summary.add_operation(Operation::with_details(Verb::Skip, name, "not found"));
        }
        for name in &self.unmanaged {
            summary.add_operation(Operation::with_details(Verb::Skip, name, "no units"));
        }

        summary
    }

    fn execute(self, ctx: &mut ExecuteContext<'_>) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::new();
        let reload = self.needs_reload();

        for removal in &self.removals {
            info!(utility = %removal.utility, "Disabling utility");
            for unit in &removal.units {
                apply_step(ctx, &mut report, UnitAction::Stop, unit);
                apply_step(ctx, &mut report, UnitAction::Disable, unit);
                remove_unit_file(ctx, &mut report, &self.unit_dir.join(unit), unit);
            }
        }

        let mut ready = Vec::with_capacity(self.enables.len());
        for enablement in &self.enables {
            info!(utility = %enablement.utility, "Enabling utility");
            if install_files(ctx, &mut report, enablement, &self.unit_dir, &self.install_root) {
                ready.push(enablement);
            }
        }

        if reload {
            match ctx.manager().daemon_reload() {
                Ok(()) => ctx.record(
                    &mut report,
                    OperationResult::success(Operation::new(Verb::Reload, "systemd")),
                ),
                Err(e) => {
                    warn!("daemon-reload failed: {:#}", e);
                    ctx.record(
                        &mut report,
                        OperationResult::failure(
                            Operation::new(Verb::Reload, "systemd"),
                            format!("{e:#}"),
                        ),
                    );
                }
            }
        }

        for enablement in ready {
            for step in enablement.steps() {
                if step.enable {
                    apply_step(ctx, &mut report, UnitAction::Enable, &step.unit);
                }
                if step.start {
                    apply_step(ctx, &mut report, UnitAction::Start, &step.unit);
                }
            }
        }

        Ok(report)
    }

    fn is_empty(&self) -> bool {
        !self.describe().has_actions()
    }
}

/// Provision and write unit files. Returns false when the utility must not
/// be enabled.
fn install_files(
    ctx: &ExecuteContext<'_>,
    report: &mut ExecutionReport,
    enablement: &Enablement,
    unit_dir: &Path,
    install_root: &Path,
) -> bool {
    let utility = enablement.utility.as_str();

    if let Some(step) = &enablement.provision {
        match provision::provision(utility, &step.template, &step.dest, ctx.prompter()) {
            Ok(ProvisionOutcome::Provisioned) => ctx.record(
                report,
                OperationResult::success(Operation::new(Verb::Provision, utility)),
            ),
            Ok(outcome) => debug!(utility, ?outcome, "Provisioning skipped"),
            Err(e) => {
                warn!(utility, "Provisioning failed: {:#}", e);
                ctx.record(
                    report,
                    OperationResult::failure(
                        Operation::new(Verb::Provision, utility),
                        format!("{e:#}"),
                    ),
                );
                return false;
            }
        }
    }

    if enablement.writes.is_empty() {
        return true;
    }

    let installer = UnitInstaller::new(
        unit_dir,
        install_root,
        ctx.settings().config_dir_for(utility),
    );
    match installer.install(&enablement.writes) {
        Ok(written) => {
            for unit in written {
                ctx.record(
                    report,
                    OperationResult::success(Operation::new(Verb::Install, unit)),
                );
            }
            true
        }
        Err(e) => {
            warn!(utility, "Unit install failed: {}", e);
            ctx.record(
                report,
                OperationResult::failure(Operation::new(Verb::Install, utility), e.to_string()),
            );
            false
        }
    }
}

fn apply_step(
    ctx: &ExecuteContext<'_>,
    report: &mut ExecutionReport,
    action: UnitAction,
    unit: &str,
) {
    let verb = match action {
        UnitAction::Start => Verb::Start,
        UnitAction::Stop => Verb::Stop,
        UnitAction::Enable => Verb::Enable,
        UnitAction::Disable => Verb::Disable,
    };
    let result = match ctx.manager().apply(action, unit) {
        Ok(()) => OperationResult::success(Operation::new(verb, unit)),
        Err(e) => {
            warn!(unit, "{:#}", e);
            OperationResult::failure(Operation::new(verb, unit), format!("{e:#}"))
        }
    };
    ctx.record(report, result);
}

fn remove_unit_file(
    ctx: &ExecuteContext<'_>,
    report: &mut ExecutionReport,
    path: &Path,
    unit: &str,
) {
    let result = match fs::remove_file(path) {
        Ok(()) => {
            info!(unit, "Removed unit file");
            OperationResult::success(Operation::new(Verb::Remove, unit))
        }
        Err(e) => {
            warn!(unit, path = %path.display(), "Failed to remove unit file: {}", e);
            OperationResult::failure(Operation::new(Verb::Remove, unit), e.to_string())
        }
    };
    ctx.record(report, result);
}
