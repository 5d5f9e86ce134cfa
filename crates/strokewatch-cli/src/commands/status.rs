//! Service health command

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, print_info, print_json, print_table, OutputFormat};

#[derive(Tabled, Serialize)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct StatusReport {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (_, HealthResponse) = client.get_with_status("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get_with_status("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&StatusReport { health, readiness }),
        OutputFormat::Table => {
            println!("{}", "StrokeWatch Service".bold());
            println!("{}", "=".repeat(50));
            println!("Health:     {}", color_status(&health.status));
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Readiness:  {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                print_info(reason);
            }
            println!();

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            print_table(&rows, format);
        }
    }
    Ok(())
}
