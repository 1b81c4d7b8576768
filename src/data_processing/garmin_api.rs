use super::StepRecord;
use crate::errors::{Error, Result};
use chrono::NaiveDate;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

const SOCIAL_PROFILE_URL: &str = "/userprofile-service/socialProfile";
const USER_SETTINGS_URL: &str = "/userprofile-service/userprofile/user-settings";
const LEADERBOARD_URL: &str = "/userstats-service/leaderboard/wellness/connection";

/// The userstats-service id of the WELLNESS_TOTAL_STEPS metric.
const STEPS_METRIC_ID: u32 = 29;

/// Email/password pair for the SSO fallback when no saved token works.
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Reads EMAIL and PASSWORD from the environment, if both are set.
    pub fn from_env() -> Option<Self> {
        let email = std::env::var("EMAIL").ok()?;
        let password = std::env::var("PASSWORD").ok()?;
        Some(Self { email, password })
    }
}

/// The OAuth token we persist between runs so that SSO only happens once.
#[derive(Serialize, Deserialize)]
struct TokenStore {
    access_token: String,
}

/// The daily wellness leaderboard as served by the userstats service.
/// Entries for each metric live under allMetrics.metricsMap.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaderboardResponse {
    all_metrics: AllMetrics,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllMetrics {
    metrics_map: MetricsMap,
}

#[derive(Deserialize)]
struct MetricsMap {
    #[serde(rename = "WELLNESS_TOTAL_STEPS", default)]
    total_steps: Vec<MetricEntry>,
}

/// A single participant's entry. Garmin serves step counts as JSON numbers
/// that sometimes arrive as floats; both key fields go missing often enough
/// that the conversion below has to tolerate it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricEntry {
    value: Option<f64>,
    user_info: Option<UserInfo>,
}

#[derive(Deserialize)]
struct UserInfo {
    fullname: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SocialProfile {
    display_name: String,
    full_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserSettings {
    user_data: UserData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserData {
    measurement_system: String,
}

/// Converts one day's leaderboard response into records, skipping entries
/// that are missing a key field. A duplicate fullname within the same
/// response keeps its first value only.
fn records_for_date(date: NaiveDate, response: LeaderboardResponse) -> Vec<StepRecord> {
    let entries = response.all_metrics.metrics_map.total_steps;
    let mut seen_names = HashMap::with_capacity(entries.len());
    let mut records = Vec::with_capacity(entries.len());

    for (i, entry) in entries.into_iter().enumerate() {
        let name = match entry.user_info.and_then(|info| info.fullname) {
            Some(name) => name,
            None => {
                tracing::warn!("Skipping entry {} on {}: no fullname", i, date);
                continue;
            }
        };
        let steps = match entry.value {
            Some(value) => value as u64,
            None => {
                tracing::warn!("Skipping entry for {} on {}: no step value", name, date);
                continue;
            }
        };
        if let Some(j) = seen_names.insert(name.clone(), i) {
            tracing::warn!(
                "Duplicate user {} on {} at positions {} and {}",
                name,
                date,
                j,
                i
            );
            continue;
        }
        records.push(StepRecord { name, date, steps });
    }
    records
}

/// Client for the Garmin Connect API.
pub struct GarminClient {
    client: Client,
    domain: &'static str,
    tokenstore: PathBuf,
    access_token: Option<String>,
    pub display_name: Option<String>,
    pub full_name: Option<String>,
    pub unit_system: Option<String>,
}

impl GarminClient {
    /// The tokenstore location comes from GARMINTOKENS, falling back to a
    /// file in the working directory.
    pub fn new(is_cn: bool) -> Self {
        let tokenstore = std::env::var("GARMINTOKENS")
            .unwrap_or_else(|_| ".garminconnect.json".to_string())
            .into();
        Self {
            client: Client::new(),
            domain: if is_cn { "garmin.cn" } else { "garmin.com" },
            tokenstore,
            access_token: None,
            display_name: None,
            full_name: None,
            unit_system: None,
        }
    }

    /// Authenticates against Garmin: first with the saved tokenstore, then
    /// with email/password if the token is absent or rejected. A fresh token
    /// is written back to the tokenstore for the next run.
    pub fn login(&mut self, credentials: Option<&Credentials>) -> Result<()> {
        if let Some(token) = self.load_tokenstore() {
            tracing::info!("connect using tokenstore {:?}", self.tokenstore);
            self.access_token = Some(token);
            match self.load_profile() {
                Ok(()) => return Ok(()),
                Err(Error::Authentication(msg)) => {
                    tracing::warn!("saved token was rejected ({}), retrying via SSO", msg);
                    self.access_token = None;
                }
                Err(err) => return Err(err),
            }
        }

        let credentials = credentials.ok_or_else(|| {
            Error::Authentication("no saved token and no credentials supplied".to_string())
        })?;
        tracing::info!("connect using email/password");
        let token = self.sso_login(credentials)?;
        if let Err(err) = self.save_tokenstore(&token) {
            tracing::warn!("could not save tokenstore {:?}: {}", self.tokenstore, err);
        }
        self.access_token = Some(token);
        self.load_profile()
    }

    /// Fetches the connection step leaderboard for a single day.
    pub fn fetch_steps(&self, date: NaiveDate) -> Result<Vec<StepRecord>> {
        let params = [
            ("metricId", STEPS_METRIC_ID.to_string()),
            ("startDate", date.to_string()),
            ("endDate", date.to_string()),
            ("start", "1".to_string()),
            ("limit", "999".to_string()),
        ];
        let response: LeaderboardResponse = self.connectapi(LEADERBOARD_URL, &params)?;
        Ok(records_for_date(date, response))
    }

    /// GETs a connectapi path with the saved bearer token.
    fn connectapi<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| Error::Authentication("not logged in".to_string()))?;
        let url = format!("https://connectapi.{}{}", self.domain, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Authentication(
                format!("request to {} was rejected", path),
            )),
            _ => Ok(response.error_for_status()?.json()?),
        }
    }

    /// Exchanges email/password for an OAuth token at the SSO endpoint.
    fn sso_login(&self, credentials: &Credentials) -> Result<String> {
        let url = format!("https://sso.{}/sso/signin", self.domain);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("username", credentials.email.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(Error::Authentication(
                "Garmin rejected the supplied email/password".to_string(),
            ));
        }
        let token: TokenStore = response.error_for_status()?.json()?;
        Ok(token.access_token)
    }

    /// Loads the social profile and user settings that the original client
    /// exposes after login.
    fn load_profile(&mut self) -> Result<()> {
        let profile: SocialProfile = self.connectapi(SOCIAL_PROFILE_URL, &[])?;
        self.display_name = Some(profile.display_name);
        self.full_name = Some(profile.full_name);

        let settings: UserSettings = self.connectapi(USER_SETTINGS_URL, &[])?;
        self.unit_system = Some(settings.user_data.measurement_system);
        Ok(())
    }

    fn load_tokenstore(&self) -> Option<String> {
        let json = std::fs::read_to_string(&self.tokenstore).ok()?;
        let token: TokenStore = serde_json::from_str(&json).ok()?;
        Some(token.access_token)
    }

    fn save_tokenstore(&self, access_token: &str) -> Result<()> {
        super::write_to_json(
            &TokenStore {
                access_token: access_token.to_string(),
            },
            &self.tokenstore,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn parse(json: &str) -> LeaderboardResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_well_formed_response() {
        let response = parse(
            r#"{"allMetrics": {"metricsMap": {"WELLNESS_TOTAL_STEPS": [
                {"value": 12034.0, "userInfo": {"fullname": "Alice"}},
                {"value": 9001, "userInfo": {"fullname": "Bob"}}
            ]}}}"#,
        );
        let records = records_for_date(date(), response);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Alice");
        assert_eq!(records[0].steps, 12034);
        assert_eq!(records[1].name, "Bob");
        assert_eq!(records[1].date, date());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let response = parse(
            r#"{"allMetrics": {"metricsMap": {"WELLNESS_TOTAL_STEPS": [
                {"value": 500, "userInfo": {"fullname": "Alice"}},
                {"userInfo": {"fullname": "NoValue"}},
                {"value": 700, "userInfo": {}},
                {"value": 800}
            ]}}}"#,
        );
        let records = records_for_date(date(), response);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Alice");
    }

    #[test]
    fn test_duplicate_fullname_keeps_first() {
        let response = parse(
            r#"{"allMetrics": {"metricsMap": {"WELLNESS_TOTAL_STEPS": [
                {"value": 100, "userInfo": {"fullname": "Alice"}},
                {"value": 999, "userInfo": {"fullname": "Alice"}}
            ]}}}"#,
        );
        let records = records_for_date(date(), response);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].steps, 100);
    }

    #[test]
    fn test_empty_metrics_map() {
        let response = parse(r#"{"allMetrics": {"metricsMap": {}}}"#);
        assert!(records_for_date(date(), response).is_empty());
    }
}
