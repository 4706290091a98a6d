//! Google Sheets v4 REST client.

use std::time::Duration;

use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::auth::{ServiceAccountKey, TokenProvider};
use super::values::{Rows, ValuesApi};
use super::SheetsError;
use crate::config::SheetKind;

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Title and tab names of a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetInfo {
    pub title: String,
    pub sheet_titles: Vec<String>,
}

impl SpreadsheetInfo {
    /// Tabs of the fixed layout that are missing from the spreadsheet.
    #[must_use]
    pub fn missing_sheets(&self) -> Vec<SheetKind> {
        SheetKind::ALL
            .into_iter()
            .filter(|kind| !self.sheet_titles.iter().any(|t| t == kind.title()))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SpreadsheetProperties,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Rows,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
}

/// Authenticated client for one spreadsheet.
pub struct SheetsClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    spreadsheet_id: String,
    base_url: Url,
}

impl SheetsClient {
    /// Creates a client for the spreadsheet using a service-account key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be used for signing.
    pub fn new(spreadsheet_id: &str, key: ServiceAccountKey) -> Result<Self, SheetsError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let tokens = TokenProvider::new(http.clone(), key)?;

        let base_url = Url::parse(&format!("{API_BASE}/{spreadsheet_id}"))
            .map_err(|e| SheetsError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            http,
            tokens,
            spreadsheet_id: spreadsheet_id.to_owned(),
            base_url,
        })
    }

    /// Email of the service account (the sheet must be shared with it).
    #[must_use]
    pub fn service_account_email(&self) -> &str {
        self.tokens.service_account_email()
    }

    /// Identifier of the target spreadsheet.
    #[must_use]
    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    /// Reads the spreadsheet title and tab names.
    ///
    /// This is the cheapest call that proves the service account has access.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if the sheet is not shared with the
    /// service account.
    pub async fn spreadsheet_info(&self) -> Result<SpreadsheetInfo, SheetsError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(self.base_url.clone())
            .bearer_auth(token)
            .query(&[("fields", "properties.title,sheets.properties.title")])
            .send()
            .await?;

        let meta: SpreadsheetMeta = self.check(response).await?.json().await?;
        let info = SpreadsheetInfo {
            title: meta.properties.title,
            sheet_titles: meta.sheets.into_iter().map(|s| s.properties.title).collect(),
        };

        info!(
            "Opened spreadsheet '{}' ({} tabs)",
            info.title,
            info.sheet_titles.len()
        );
        Ok(info)
    }

    /// Builds `.../values/'SHEET'!RANGE[suffix]`.
    fn values_url(&self, sheet: SheetKind, range: &str, suffix: &str) -> Result<Url, SheetsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SheetsError::InvalidUrl(self.base_url.to_string()))?
            .push("values")
            .push(&format!("{}{}", qualified_range(sheet, range), suffix));
        Ok(url)
    }

    /// Maps non-success responses to typed errors.
    async fn check(&self, response: Response) -> Result<Response, SheetsError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GoogleErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);

        match status {
            StatusCode::FORBIDDEN => {
                warn!(
                    "Sheets API denied access; share the spreadsheet with {} as editor",
                    self.service_account_email()
                );
                Err(SheetsError::PermissionDenied)
            }
            StatusCode::NOT_FOUND => Err(SheetsError::SpreadsheetNotFound(self.spreadsheet_id.clone())),
            StatusCode::UNAUTHORIZED => {
                self.tokens.invalidate().await;
                Err(SheetsError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
            _ => Err(SheetsError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

impl ValuesApi for SheetsClient {
    async fn get_range(&self, sheet: SheetKind, range: &str) -> Result<Rows, SheetsError> {
        let url = self.values_url(sheet, range, "")?;
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&[
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("dateTimeRenderOption", "SERIAL_NUMBER"),
            ])
            .send()
            .await?;

        let value_range: ValueRange = self.check(response).await?.json().await?;
        debug!(
            "Read {}!{} ({} rows)",
            sheet,
            range,
            value_range.values.len()
        );
        Ok(value_range.values)
    }

    async fn update_range(&self, sheet: SheetKind, range: &str, rows: Rows) -> Result<(), SheetsError> {
        let url = self.values_url(sheet, range, "")?;
        let token = self.tokens.access_token().await?;

        let body = json!({
            "range": qualified_range(sheet, range),
            "majorDimension": "ROWS",
            "values": rows,
        });

        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW")])
            .json(&body)
            .send()
            .await?;

        self.check(response).await?;
        debug!("Updated {}!{}", sheet, range);
        Ok(())
    }

    async fn clear_range(&self, sheet: SheetKind, range: &str) -> Result<(), SheetsError> {
        let url = self.values_url(sheet, range, ":clear")?;
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;

        self.check(response).await?;
        debug!("Cleared {}!{}", sheet, range);
        Ok(())
    }
}

impl std::fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsClient")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// Prefixes a range with the quoted tab title.
fn qualified_range(sheet: SheetKind, range: &str) -> String {
    format!("'{}'!{}", sheet.title(), range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_range() {
        assert_eq!(qualified_range(SheetKind::Clients, "A2:G502"), "'CLIENTS'!A2:G502");
    }

    #[test]
    fn test_missing_sheets() {
        let info = SpreadsheetInfo {
            title: "Agency".to_owned(),
            sheet_titles: vec![
                "GENERAL".to_owned(),
                "CLIENTS".to_owned(),
                "DESIGNERS".to_owned(),
                "Notes".to_owned(),
            ],
        };
        assert_eq!(
            info.missing_sheets(),
            vec![SheetKind::Expenses, SheetKind::Whitelist, SheetKind::Blacklist]
        );
    }

    #[test]
    fn test_value_range_without_values() {
        let parsed: ValueRange =
            serde_json::from_str(r#"{"range": "'GENERAL'!A2:L502", "majorDimension": "ROWS"}"#)
                .unwrap();
        assert!(parsed.values.is_empty());
    }

    #[test]
    fn test_google_error_body() {
        let body = r#"{"error": {"code": 403, "message": "The caller does not have permission", "status": "PERMISSION_DENIED"}}"#;
        let parsed: GoogleErrorBody = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "The caller does not have permission");
    }
}
