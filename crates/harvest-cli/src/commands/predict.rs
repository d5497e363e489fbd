//! Prediction command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, PredictionInput};
use crate::output::{
    format_optional, format_quantity, print_info, print_json, print_table, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Season")]
    season: String,
    #[tabled(rename = "District")]
    district: String,
    #[tabled(rename = "Year")]
    year: i32,
    #[tabled(rename = "Extent (ha)")]
    extent: String,
    #[tabled(rename = "Production")]
    production: String,
}

pub async fn predict(client: &ApiClient, input: PredictionInput, format: OutputFormat) -> Result<()> {
    let response = client.predict(&input).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_table(vec![PredictionRow {
                season: input.season.clone(),
                district: input.district.to_uppercase(),
                year: input.year,
                extent: format_optional(response.predicted_extent),
                production: format_quantity(response.predicted_production),
            }]);

            match &response.record_id {
                Some(id) => print_info(&format!("Saved as {}", id)),
                None if client.has_token() => print_warning("Prediction was not saved"),
                None => {}
            }
        }
    }

    Ok(())
}
