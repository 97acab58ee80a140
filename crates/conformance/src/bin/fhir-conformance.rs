//! Operator tool for the FHIR conformance harness.
//!
//! Checks that a server is reachable before a run and cleans up after runs
//! that were interrupted before their teardown could execute.

use clap::{Parser, Subcommand};
use helios_conformance::{ConformanceConfig, FhirClient, SearchParams, init_logging};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "fhir-conformance")]
#[command(about = "FHIR R5 RESTful API conformance harness")]
struct Cli {
    #[command(flatten)]
    config: ConformanceConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the CapabilityStatement and report what the server supports.
    Check,

    /// Conditionally delete resources left behind by an interrupted run.
    Cleanup {
        /// Resource type to delete from.
        #[arg(long = "type", default_value = "Patient")]
        resource_type: String,

        /// Search parameter identifying the leftovers.
        #[arg(long, default_value = "family")]
        param: String,

        /// Marker value, e.g. TransactionTest.
        #[arg(long)]
        value: String,
    },

    /// Purge the storage schema of a resource type (requires FHIR_PURGE_KEY).
    Purge {
        /// Resource type to purge.
        #[arg(long = "type")]
        resource_type: String,
    },
}

async fn check(client: &FhirClient) -> anyhow::Result<bool> {
    let response = client.capabilities().await?;
    if response.status() != 200 {
        warn!(status = response.status(), "CapabilityStatement request failed");
        return Ok(false);
    }

    let statement = response.json()?;
    let fhir_version = statement
        .get("fhirVersion")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let resource_types = statement
        .get("rest")
        .and_then(Value::as_array)
        .and_then(|rest| rest.first())
        .and_then(|rest| rest.get("resource"))
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);

    info!(
        base_url = %client.base_url(),
        fhir_version = %fhir_version,
        resource_types,
        "Server is reachable"
    );
    if !fhir_version.starts_with("5.") {
        warn!(fhir_version = %fhir_version, "Server does not advertise FHIR R5");
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.config.log_level);

    if let Err(errors) = cli.config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let client = FhirClient::new(&cli.config)?;

    match cli.command {
        Command::Check => {
            if !check(&client).await? {
                std::process::exit(1);
            }
        }
        Command::Cleanup {
            resource_type,
            param,
            value,
        } => {
            let criteria = SearchParams::new().param(param, value);
            let response = client.conditional_delete(&resource_type, &criteria).await?;
            info!(
                resource_type = %resource_type,
                criteria = %criteria,
                status = response.status(),
                "Conditional delete issued"
            );
        }
        Command::Purge { resource_type } => {
            let key = cli.config.purge_key().ok_or_else(|| {
                helios_conformance::ConformanceError::NotConfigured(
                    "FHIR_PURGE_KEY is required for purge".to_string(),
                )
            })?;
            let response = client.purge_schema(&resource_type, key).await?;
            info!(
                resource_type = %resource_type,
                status = response.status(),
                "Schema purge issued"
            );
        }
    }

    Ok(())
}
