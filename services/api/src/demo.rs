use crate::cli::PolicyArgs;
use crate::infra::InMemoryInspectionStore;
use chrono::{Local, NaiveDate};
use clap::Args;
use inspection_engine::config::AppConfig;
use inspection_engine::error::AppError;
use inspection_engine::workflows::readings::{
    Attestation, ChangeRequest, Chemistry, HeaderRecord, PipelineReport, PresetAnswers,
    ReadingsService, ReconciledField, ReconciliationRecord, SaveMode, SaveRequest, StageOutcome,
    Topology, UnitConfiguration, UnitKey,
};
use std::sync::Arc;

/// Block voltages cycled across the demo string; the third block sits in the monitor band.
const DEMO_VOLTAGES: [f64; 6] = [13.52, 13.48, 12.55, 13.41, 13.50, 13.46];

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Inspection date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Number of 12 V blocks in the demo string.
    #[arg(long, default_value_t = 6)]
    pub(crate) units: u32,
    #[command(flatten)]
    pub(crate) policy: PolicyArgs,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        units,
        policy,
    } = args;

    let config = AppConfig::load()?;
    let table = policy.resolve(config.policy).load_table()?;
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    let store = Arc::new(InMemoryInspectionStore::seeded());
    let service = ReadingsService::new(store.clone(), table);

    println!("Inspection engine demo");
    println!("- policy table {}", service.policy().version);

    let header = demo_header(units.max(2), today);
    let configured = match service
        .apply_change(
            ChangeRequest {
                header,
                rows: Vec::new(),
            },
            &PresetAnswers::default(),
        )
        .await
    {
        Ok(report) => report,
        Err(err) => {
            println!("  Configuration rejected: {err}");
            return Ok(());
        }
    };
    if let Some(plan) = &configured.row_plan {
        println!(
            "- Configured {} ({}): {} rows synthesized",
            configured.header.key,
            configured.header.configuration.topology.label(),
            plan.added.len()
        );
    }

    let mut rows = configured.rows.clone();
    for (row, voltage) in rows.iter_mut().zip(DEMO_VOLTAGES.iter().cycle()) {
        row.voltage = *voltage;
        row.conductance = 1420.0;
    }

    let request = SaveRequest {
        reconciliation: attested(&configured.header),
        header: configured.header.clone(),
        rows,
        mode: SaveMode::Final,
        evaluated_on: today,
    };
    let report = match service.submit(request, &PresetAnswers::default()).await {
        Ok(report) => report,
        Err(err) => {
            println!("  Save failed: {err}");
            return Ok(());
        }
    };
    render_report(&report);
    println!("- Status updates persisted: {}", store.statuses().len());

    println!("\nShrinking the string without confirming removal");
    let mut shrunk = report.header.clone();
    shrunk.configuration.units_per_group = shrunk.configuration.units_per_group.saturating_sub(2);
    let outcome = service
        .apply_change(
            ChangeRequest {
                header: shrunk,
                rows: report.rows.clone(),
            },
            &PresetAnswers::default(),
        )
        .await;
    match outcome {
        Ok(report) => println!("  Change applied; {} rows remain", report.rows.len()),
        Err(err) => println!("  Change refused: {err}"),
    }

    Ok(())
}

fn demo_header(units: u32, today: NaiveDate) -> HeaderRecord {
    let configuration = UnitConfiguration {
        topology: Topology::External,
        units_per_group: units,
        group_count: 1,
    };
    let mut header = HeaderRecord::new(
        UnitKey::new("J-DEMO", "UPS-7", "STR-A"),
        configuration,
        Chemistry::Vrla,
    );
    header.make = "C&D".to_string();
    header.model = "UPS12-370".to_string();
    header.serial_number = "CD-90211".to_string();
    header.location = "Data Hall 2".to_string();
    header.sub_type_name = "12V block".to_string();
    header.date_code = today.checked_sub_signed(chrono::Duration::days(3 * 365 + 30));
    header
}

fn attested(header: &HeaderRecord) -> ReconciliationRecord {
    let mut record = ReconciliationRecord::from_header(header);
    for field in ReconciledField::ALL {
        record.set_attestation(field, Attestation::Correct);
    }
    record.verified = true;
    record
}

fn render_report(report: &PipelineReport) {
    println!("- Save pipeline trace:");
    for record in &report.stages {
        match &record.outcome {
            StageOutcome::Completed => println!("    {} ok", record.stage),
            StageOutcome::Degraded { reason } => {
                println!("    {} degraded: {reason}", record.stage)
            }
        }
    }

    if !report.reloaded {
        println!("  reload failed; values below are the unsaved working copy");
    }

    println!("- Readings:");
    for row in &report.rows {
        let plan = if row.action_plan.is_empty() {
            String::new()
        } else {
            format!(" ({})", row.action_plan)
        };
        println!(
            "    #{:<3} {:>6.2} V  {}{}",
            row.index,
            row.voltage,
            row.verdict.label(),
            plan
        );
    }

    println!(
        "- Status: {} | replace {} | monitor {}",
        report.header.status.label(),
        report.header.replace_count,
        report.header.monitor_count
    );
    if let Some(decision) = &report.status {
        println!("  decided by {:?}", decision.rule);
    }
}
