//! Activity history and service health commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_optional, format_quantity, format_timestamp, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

/// Row for activity table
#[derive(Tabled)]
struct ActivityRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Created")]
    created_at: String,
    #[tabled(rename = "Season")]
    season: String,
    #[tabled(rename = "District")]
    district: String,
    #[tabled(rename = "Year")]
    year: i32,
    #[tabled(rename = "Sown (ha)")]
    sown: String,
    #[tabled(rename = "Extent (ha)")]
    extent: String,
    #[tabled(rename = "Production")]
    production: String,
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn show_history(client: &ApiClient, limit: Option<usize>, format: OutputFormat) -> Result<()> {
    let records = client.history(limit).await?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            if records.is_empty() {
                print_warning("No predictions recorded yet");
                return Ok(());
            }

            let rows: Vec<ActivityRow> = records
                .iter()
                .map(|r| ActivityRow {
                    id: r.id.clone(),
                    created_at: format_timestamp(&r.created_at),
                    season: r.season.clone(),
                    district: r.district.clone(),
                    year: r.year,
                    sown: format_quantity(r.sown_hect),
                    extent: format_optional(r.predicted_extent),
                    production: format_quantity(r.predicted_production),
                })
                .collect();

            let total = rows.len();
            print_table(rows);
            println!("\nTotal: {} predictions", total);
        }
    }

    Ok(())
}

pub async fn show_record(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let record = client.record(id).await?;

    match format {
        OutputFormat::Json => print_json(&record)?,
        OutputFormat::Table => {
            println!("Prediction: {}", record.id);
            println!("Created: {}", format_timestamp(&record.created_at));
            println!("Season: {}", record.season);
            println!("District: {}", record.district);
            println!("Year: {}", record.year);
            println!("Sown: {} ha", format_quantity(record.sown_hect));
            println!("Previous yield: {}", format_quantity(record.previous_yield));
            if let Some(previous) = record.previous_production {
                println!("Previous production: {}", format_quantity(previous));
            }
            println!("\nPredicted extent: {}", format_optional(record.predicted_extent));
            println!("Predicted production: {}", format_quantity(record.predicted_production));
        }
    }

    Ok(())
}

pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!("Status: {}", color_status(&status.health.status));

            let mut rows: Vec<ComponentRow> = status
                .health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            if !rows.is_empty() {
                print_table(rows);
            }

            if status.readiness.ready {
                print_success(&format!(
                    "Ready, serving seasons: {}",
                    status.readiness.seasons.join(", ")
                ));
            } else {
                print_warning(&format!(
                    "Not ready: {}",
                    status.readiness.reason.as_deref().unwrap_or("unknown")
                ));
            }
        }
    }

    Ok(())
}
