//! Google Sheets reader

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{http, Result, SyncError};
use crate::core::config::IngestionConfig;

/// Reads spreadsheet tabs as a grid of cells, header row first
pub trait SheetsClient {
    fn read_tab(&self, sheet_id: &str, tab_id: &str) -> Result<Vec<Vec<String>>>;
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Sheets v4 REST client authenticated with an API key
pub struct GoogleSheetsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleSheetsClient {
    pub fn new(config: &IngestionConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.http_timeout_secs, &http::api_user_agent(), None)?,
            base_url: config.sheets.base_url.clone(),
            api_key: config.sheets.api_key.clone(),
        })
    }

    /// Worksheet title of a numeric tab id
    fn tab_title(&self, sheet_id: &str, tab_id: &str, key: &str) -> Result<String> {
        let wanted: i64 = tab_id
            .trim()
            .parse()
            .map_err(|_| SyncError::Decode(format!("tab id '{}' is not numeric", tab_id)))?;
        let mut url = http::join(&self.base_url, &format!("/v4/spreadsheets/{}", sheet_id))?;
        url.query_pairs_mut()
            .append_pair("key", key)
            .append_pair("fields", "sheets.properties");
        let spreadsheet: Spreadsheet = http::check(self.client.get(url).send()?)?
            .json()
            .map_err(|e| SyncError::Decode(e.to_string()))?;
        spreadsheet
            .sheets
            .into_iter()
            .find(|s| s.properties.sheet_id == wanted)
            .map(|s| s.properties.title)
            .ok_or_else(|| SyncError::Decode(format!("no worksheet found with id {}", tab_id)))
    }
}

impl SheetsClient for GoogleSheetsClient {
    fn read_tab(&self, sheet_id: &str, tab_id: &str) -> Result<Vec<Vec<String>>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(SyncError::NotConfigured("sheets.api_key"))?;
        let title = self.tab_title(sheet_id, tab_id, key)?;
        debug!(sheet_id, tab = %title, "worksheet found");

        let mut url = http::join(
            &self.base_url,
            &format!("/v4/spreadsheets/{}/values/", sheet_id),
        )?;
        url.path_segments_mut()
            .map_err(|_| SyncError::Transport("sheets base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .push(&title);
        url.query_pairs_mut().append_pair("key", key);

        let range: ValueRange = http::check(self.client.get(url).send()?)?
            .json()
            .map_err(|e| SyncError::Decode(e.to_string()))?;
        let rows: Vec<Vec<String>> = range
            .values
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| match cell {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect();
        info!(sheet_id, rows = rows.len(), "worksheet read");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: String, key: Option<&str>) -> IngestionConfig {
        let mut config = IngestionConfig::default();
        config.sheets.base_url = url;
        config.sheets.api_key = key.map(|k| k.to_string());
        config
    }

    #[test]
    fn test_read_tab_by_numeric_id() {
        let mut server = mockito::Server::new();
        let _meta = server
            .mock("GET", "/v4/spreadsheets/abc")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "k".into()))
            .with_status(200)
            .with_body(r#"{"sheets":[{"properties":{"sheetId":0,"title":"Intro"}},{"properties":{"sheetId":42,"title":"Input Data"}}]}"#)
            .create();
        let values = server
            .mock("GET", "/v4/spreadsheets/abc/values/Input%20Data")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"values":[["Title","Number"],["Intro Bio",101]]}"#)
            .create();

        let client = GoogleSheetsClient::new(&config(server.url(), Some("k"))).unwrap();
        let rows = client.read_tab("abc", "42").unwrap();
        assert_eq!(rows[0], ["Title", "Number"]);
        assert_eq!(rows[1], ["Intro Bio", "101"]);
        values.assert();
    }

    #[test]
    fn test_unknown_tab_is_error() {
        let mut server = mockito::Server::new();
        let _meta = server
            .mock("GET", "/v4/spreadsheets/abc")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"sheets":[]}"#)
            .create();

        let client = GoogleSheetsClient::new(&config(server.url(), Some("k"))).unwrap();
        assert!(matches!(client.read_tab("abc", "7"), Err(SyncError::Decode(_))));
    }

    #[test]
    fn test_missing_api_key() {
        let client = GoogleSheetsClient::new(&config("http://localhost".into(), None)).unwrap();
        assert!(matches!(
            client.read_tab("abc", "0"),
            Err(SyncError::NotConfigured(_))
        ));
    }
}
