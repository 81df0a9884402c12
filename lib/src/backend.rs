use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use hyper::{Body, Request, StatusCode, Uri};
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::dataset::{normalize_timestamp, Row};
use crate::error::{Error, Result};
use crate::http::{ensure_success, read_body, Transport};
use crate::retry::{send_with_retry, RetryPolicy};

#[derive(Debug, Deserialize)]
struct LocationsResponse {
    #[serde(default)]
    locations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    latest: Option<Row>,
}

#[derive(Debug, Deserialize)]
struct DateRangeResponse {
    #[serde(default)]
    data: Vec<Row>,
}

/// Client for the sensor time-series backend.
///
/// The backend runs on a host that sleeps when idle, so every call goes
/// through the retry policy.
pub struct SensorApi {
    transport: Arc<dyn Transport>,
    base: Url,
    retry: RetryPolicy,
    locations: Mutex<Option<Vec<String>>>,
}

impl SensorApi {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, retry: RetryPolicy) -> Result<Self> {
        // Url::join drops the last path segment unless it ends in a slash.
        let base = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };
        Ok(SensorApi {
            transport,
            base,
            retry,
            locations: Mutex::new(None),
        })
    }

    fn uri(&self, path: &str, query: &[(&str, &str)]) -> Result<Uri> {
        let mut url = self.base.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(Uri::from_str(url.as_str())?)
    }

    async fn get(&self, uri: Uri) -> Result<(StatusCode, hyper::body::Bytes)> {
        let res = send_with_retry(self.transport.as_ref(), &self.retry, || {
            Ok(Request::get(uri.clone())
                .header("accept", "application/json")
                .body(Body::empty())?)
        })
        .await?;
        read_body(res).await
    }

    /// Locations the backend has data for, lowercased. Cached after the
    /// first successful call.
    pub async fn supported_locations(&self) -> Result<Vec<String>> {
        let mut cached = self.locations.lock().await;
        if let Some(locations) = cached.as_ref() {
            return Ok(locations.clone());
        }

        let (status, body) = self.get(self.uri("", &[])?).await?;
        let body = ensure_success(status, body)?;
        let res: LocationsResponse = serde_json::from_slice(&body)?;
        let locations: Vec<String> = res.locations.iter().map(|l| l.to_lowercase()).collect();
        log::debug!("supported locations: {:?}", locations);
        *cached = Some(locations.clone());
        Ok(locations)
    }

    pub async fn validate_location(&self, location: &str) -> Result<()> {
        if location.trim().is_empty() {
            return Err(Error::MissingLocation);
        }
        let wanted = location.to_lowercase();
        if self.supported_locations().await?.contains(&wanted) {
            Ok(())
        } else {
            Err(Error::UnsupportedLocation(location.to_string()))
        }
    }

    /// Most recent reading at `location`, or `None` if the backend has none.
    pub async fn latest(&self, location: &str) -> Result<Option<Row>> {
        self.validate_location(location).await?;

        let (status, body) = self.get(self.uri("latest", &[("location", location)])?).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = ensure_success(status, body)?;
        let res: LatestResponse = serde_json::from_slice(&body)?;
        Ok(res.latest.map(|mut row| {
            normalize_timestamp(&mut row);
            row
        }))
    }

    /// Readings at `location` between two dates, inclusive. An empty range
    /// yields no rows rather than an error.
    pub async fn by_date_range(
        &self,
        location: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Row>> {
        self.validate_location(location).await?;

        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let uri = self.uri(
            "by-date-range",
            &[("location", location), ("start", &start), ("end", &end)],
        )?;
        let (status, body) = self.get(uri).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = ensure_success(status, body)?;
        let res: DateRangeResponse = serde_json::from_slice(&body)?;
        log::info!("fetched {} records for {}", res.data.len(), location);
        Ok(res
            .data
            .into_iter()
            .map(|mut row| {
                normalize_timestamp(&mut row);
                row
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::{respond, MockTransport};
    use serde_json::json;
    use std::time::Duration;

    fn backend() -> Arc<MockTransport> {
        Arc::new(MockTransport::routes(|parts, _| {
            let query = parts.uri.query().unwrap_or("");
            match parts.uri.path() {
                "/" => respond(200, r#"{"status":"ok","locations":["Semantan","kechau"]}"#),
                "/latest" if query.contains("location=kechau") => respond(404, "no data"),
                "/latest" => respond(
                    200,
                    json!({
                        "location": "semantan",
                        "file": "2024-03-05.csv",
                        "latest": {"timestamp": "05/03/2024 10:00:00", "pH_Sensor": 7.1}
                    })
                    .to_string(),
                ),
                "/by-date-range" if query.contains("start=2024-01-01") => respond(404, ""),
                "/by-date-range" => respond(
                    200,
                    json!({
                        "location": "semantan",
                        "start": "2024-03-05",
                        "end": "2024-03-06",
                        "files_used": ["a.csv"],
                        "total_rows": 2,
                        "data": [
                            {"timestamp": "05/03/2024 10:00:00", "DO_Sensor": 6.0},
                            {"Timestamp": "06/03/2024 10:00:00", "DO_Sensor": 6.2}
                        ]
                    })
                    .to_string(),
                ),
                _ => respond(500, "unexpected"),
            }
        }))
    }

    fn api(transport: Arc<MockTransport>) -> SensorApi {
        let retry = RetryPolicy {
            retries: 1,
            backoff: Duration::from_millis(1),
        };
        SensorApi::new(transport, "http://sensors.test", retry).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn caches_lowercased_locations() {
        let transport = backend();
        let api = api(transport.clone());
        assert_eq!(api.supported_locations().await.unwrap(), vec!["semantan", "kechau"]);
        assert_eq!(api.supported_locations().await.unwrap(), vec!["semantan", "kechau"]);
        assert_eq!(transport.recorded().len(), 1);
    }

    #[tokio::test]
    async fn validates_locations() {
        let api = api(backend());
        assert!(matches!(
            api.validate_location("").await,
            Err(Error::MissingLocation)
        ));
        assert!(matches!(
            api.validate_location("bilut").await,
            Err(Error::UnsupportedLocation(l)) if l == "bilut"
        ));
        api.validate_location("SEMANTAN").await.unwrap();
    }

    #[tokio::test]
    async fn latest_normalizes_timestamp() {
        let transport = backend();
        let api = api(transport.clone());
        let row = api.latest("semantan").await.unwrap().unwrap();
        assert_eq!(row["Timestamp"], json!("05/03/2024 10:00:00"));
        assert_eq!(row["pH_Sensor"], json!(7.1));

        let requests = transport.recorded();
        let last = requests.last().unwrap();
        assert_eq!(last.uri.to_string(), "http://sensors.test/latest?location=semantan");
    }

    #[tokio::test]
    async fn latest_not_found_is_none() {
        let api = api(backend());
        assert!(api.latest("kechau").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn date_range_rows() {
        let transport = backend();
        let api = api(transport.clone());
        let rows = api
            .by_date_range("semantan", date("2024-03-05"), date("2024-03-06"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Timestamp"], json!("05/03/2024 10:00:00"));
        assert_eq!(rows[1]["Timestamp"], json!("06/03/2024 10:00:00"));

        let uri = transport.recorded().last().unwrap().uri.to_string();
        assert_eq!(
            uri,
            "http://sensors.test/by-date-range?location=semantan&start=2024-03-05&end=2024-03-06"
        );
    }

    #[tokio::test]
    async fn empty_range_is_empty() {
        let api = api(backend());
        let rows = api
            .by_date_range("semantan", date("2024-01-01"), date("2024-01-02"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn server_errors_surface_status() {
        let transport = Arc::new(MockTransport::scripted(vec![Ok((500, "broken".into()))]));
        let api = api(transport);
        let err = api.supported_locations().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn keeps_base_path() {
        let transport = backend();
        let api = SensorApi::new(transport.clone(), "http://sensors.test/v1", RetryPolicy::none())
            .unwrap();
        let _ = api.supported_locations().await;
        assert_eq!(
            transport.recorded()[0].uri.to_string(),
            "http://sensors.test/v1/"
        );
    }
}
