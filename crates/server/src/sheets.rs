//! Roster source backed by the Google Sheets values API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use rostergate_core::config::RosterConfig;
use rostergate_core::domain::roster::RosterSheet;
use rostergate_core::verification::ports::{RosterError, RosterSource};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct SheetsRosterSource {
    client: Client,
    base_url: String,
    sheet_id: String,
    range: String,
    api_key: Option<SecretString>,
}

impl SheetsRosterSource {
    pub fn from_config(config: &RosterConfig) -> Result<Self, RosterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| RosterError::Fetch(format!("http client setup failed: {error}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            sheet_id: config.sheet_id.clone(),
            range: config.range.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn values_url(&self) -> Result<Url, RosterError> {
        values_url(&self.base_url, &self.sheet_id, &self.range, self.api_key.as_ref())
    }
}

#[async_trait]
impl RosterSource for SheetsRosterSource {
    async fn fetch_roster(&self) -> Result<RosterSheet, RosterError> {
        let url = self.values_url()?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| RosterError::Fetch(format!("roster request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "roster.sheets.fetch_failed",
                sheet_id = %self.sheet_id,
                status = %status,
                "roster spreadsheet request was rejected"
            );
            return Err(RosterError::Fetch(format!("sheets api returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|error| RosterError::Fetch(format!("roster body unreadable: {error}")))?;
        let sheet = parse_value_range(&body)?;
        debug!(
            event_name = "roster.sheets.fetched",
            sheet_id = %self.sheet_id,
            rows = sheet.rows.len(),
            "roster spreadsheet fetched"
        );
        Ok(sheet)
    }
}

fn values_url(
    base_url: &str,
    sheet_id: &str,
    range: &str,
    api_key: Option<&SecretString>,
) -> Result<Url, RosterError> {
    let mut url = Url::parse(base_url)
        .map_err(|error| RosterError::Fetch(format!("invalid roster base url: {error}")))?;
    url.path_segments_mut()
        .map_err(|()| RosterError::Fetch("roster base url cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(["v4", "spreadsheets", sheet_id, "values", range]);
    if let Some(key) = api_key {
        url.query_pairs_mut().append_pair("key", key.expose_secret());
    }
    Ok(url)
}

/// First row holds the headers; cells are stringified, numbers included.
pub fn parse_value_range(body: &str) -> Result<RosterSheet, RosterError> {
    let payload: ValueRange = serde_json::from_str(body)
        .map_err(|error| RosterError::Malformed(format!("unexpected sheets payload: {error}")))?;

    let grid = payload
        .values
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    if grid.first().map_or(true, |headers| headers.iter().all(|cell| cell.trim().is_empty())) {
        return Err(RosterError::Malformed("roster sheet has no header row".to_string()));
    }

    Ok(RosterSheet::from_grid(grid))
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
