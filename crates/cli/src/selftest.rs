//! `quayside run` and `quayside scenarios`: the standard played against
//! itself, in process.

use std::error::Error;
use std::sync::Arc;

use serde_json::json;

use quayside_core::{ComponentFactory, PartyConfiguration, PartyNames};
use quayside_pint::PintComponentFactory;
use quayside_sandbox::{
    ManualTaskQueue, OrchestratorConfiguration, Sandbox, SandboxConfiguration,
    StandardConfiguration,
};
use quayside_storage::MemoryLockingMap;

use crate::OutputFormat;

const SELF_TEST_ID: &str = "self-test";

/// Upper bound on deferred tasks for one run; a run that needs more is stuck.
const MAX_TASKS: usize = 1_000_000;

fn simulated_parties(factory: &PintComponentFactory) -> Vec<PartyConfiguration> {
    factory
        .role_names()
        .iter()
        .map(|role| PartyConfiguration {
            name: format!("{role}1"),
            role: role.to_string(),
            in_sandbox: true,
        })
        .collect()
}

pub(crate) async fn run(
    parallel: usize,
    roles: Vec<String>,
    detailed: bool,
    output: OutputFormat,
) -> Result<(), Box<dyn Error>> {
    let factory = Arc::new(PintComponentFactory::new()?);
    let config = SandboxConfiguration {
        id: SELF_TEST_ID.to_string(),
        name: format!("{} self test", factory.report_title()),
        standard: StandardConfiguration {
            name: factory.standard_name().to_string(),
            version: factory.standard_version().to_string(),
        },
        orchestrator: Some(OrchestratorConfiguration {
            max_parallel_scenarios: parallel,
        }),
        parties: simulated_parties(&factory),
        counterparts: Vec::new(),
        tested_roles: Vec::new(),
    };

    let tasks = Arc::new(ManualTaskQueue::new());
    let sandbox = Sandbox::in_memory(factory, MemoryLockingMap::default(), tasks.clone());
    sandbox.create(config).await?;
    let executed = tasks.drain(&sandbox, MAX_TASKS).await?;
    let status = sandbox.status(SELF_TEST_ID).await?;
    tracing::info!(executed, %status, "self test finished");

    let reports = sandbox.report(SELF_TEST_ID, &roles).await?;
    match output {
        OutputFormat::Json => {
            let body = if detailed {
                serde_json::to_value(&reports)?
            } else {
                serde_json::Value::Array(
                    reports
                        .iter()
                        .map(|r| json!({ "role": r.role, "digest": r.report.digest() }))
                        .collect(),
                )
            };
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            for role_report in &reports {
                println!("== {} ==", role_report.role);
                if detailed {
                    print_detailed(&role_report.report, 0);
                } else {
                    print!("{}", role_report.report);
                }
            }
            if status["scenariosLeft"].as_u64().unwrap_or(0) > 0 {
                println!("{} scenarios did not finish", status["scenariosLeft"]);
            }
        }
    }
    Ok(())
}

fn print_detailed(report: &quayside_core::ConformanceReport, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}[{}] {}", report.status, report.title);
    for message in &report.error_messages {
        println!("{indent}  - {message}");
    }
    for sub in &report.sub_reports {
        print_detailed(sub, depth + 1);
    }
}

pub(crate) fn list_scenarios(output: OutputFormat) -> Result<(), Box<dyn Error>> {
    let factory = PintComponentFactory::new()?;
    let names = PartyNames::from_configuration(factory.role_names(), &simulated_parties(&factory))?;
    let modules: Vec<(String, Vec<String>)> = factory
        .create_scenario_modules(&names)
        .iter()
        .enumerate()
        .map(|(index, module)| {
            let titles = module
                .builder
                .build_scenario_list(index)
                .iter()
                .map(|scenario| scenario.title())
                .collect();
            (module.title.clone(), titles)
        })
        .collect();

    match output {
        OutputFormat::Json => {
            let body: Vec<_> = modules
                .iter()
                .map(|(title, scenarios)| json!({ "title": title, "scenarios": scenarios }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            println!("{}", factory.report_title());
            for (title, scenarios) in &modules {
                println!("  {} ({})", title, scenarios.len());
                for scenario in scenarios {
                    println!("    - {}", scenario);
                }
            }
        }
    }
    Ok(())
}
