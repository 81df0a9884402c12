use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Uri};

use crate::dataset::CleanPayload;
use crate::error::Result;
use crate::http::{ensure_success, read_body, Transport};
use crate::retry::{send_with_retry, RetryPolicy};

/// Client for the external cleaning/classification service. It takes a raw
/// sensor CSV and returns the cleaned rows with their schema and quality
/// reports.
pub struct MlClient {
    transport: Arc<dyn Transport>,
    process_uri: Uri,
    retry: RetryPolicy,
}

impl MlClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, retry: RetryPolicy) -> Result<Self> {
        let process_uri = Uri::from_str(&format!("{}/process", base_url.trim_end_matches('/')))?;
        Ok(MlClient {
            transport,
            process_uri,
            retry,
        })
    }

    /// Upload `csv` as `upload.csv` under `dataset_id` and return the
    /// cleaned payload.
    pub async fn process(&self, csv: Bytes, dataset_id: &str) -> Result<CleanPayload> {
        let boundary = boundary();
        let body = multipart_body(&boundary, &csv, dataset_id);
        let content_type = format!("multipart/form-data; boundary={boundary}");

        log::info!("uploading {} bytes as dataset {}", csv.len(), dataset_id);
        let res = send_with_retry(self.transport.as_ref(), &self.retry, || {
            Ok(Request::post(self.process_uri.clone())
                .header(CONTENT_TYPE, content_type.as_str())
                .body(Body::from(body.clone()))?)
        })
        .await?;

        let (status, body) = read_body(res).await?;
        let body = ensure_success(status, body)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("----riverwatch{nanos:x}")
}

fn multipart_body(boundary: &str, csv: &[u8], dataset_id: &str) -> Bytes {
    let mut body = Vec::with_capacity(csv.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"upload.csv\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: text/csv\r\n\r\n");
    body.extend_from_slice(csv);
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"dataset_id\"\r\n\r\n");
    body.extend_from_slice(dataset_id.as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Bytes::from(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::http::testing::{respond, MockTransport};
    use serde_json::json;

    #[test]
    fn multipart_layout() {
        let body = multipart_body("XYZ", b"a,b\n1,2\n", "ds-1");
        let expected = "--XYZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"upload.csv\"\r\n\
Content-Type: text/csv\r\n\r\n\
a,b\n1,2\n\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"dataset_id\"\r\n\r\n\
ds-1\r\n\
--XYZ--\r\n";
        assert_eq!(std::str::from_utf8(&body).unwrap(), expected);
    }

    #[tokio::test]
    async fn posts_csv_and_parses_payload() {
        let transport = Arc::new(MockTransport::routes(|parts, body| {
            assert_eq!(parts.uri.path(), "/process");
            let ct = parts.headers[CONTENT_TYPE].to_str().unwrap();
            assert!(ct.starts_with("multipart/form-data; boundary=----riverwatch"));
            let text = String::from_utf8_lossy(body);
            assert!(text.contains("pH_Sensor\n7.1\n"));
            assert!(text.contains("name=\"dataset_id\"\r\n\r\nds-1\r\n"));
            respond(
                200,
                json!({
                    "dataset_id": "ds-1",
                    "schema": {"pH_Sensor": "number"},
                    "clean_rows": [{"pH_Sensor": 7.1}],
                    "missing_report": {"pH_Sensor": 0},
                    "out_of_range_report": {}
                })
                .to_string(),
            )
        }));
        let client = MlClient::new(transport.clone(), "http://ml.test/", RetryPolicy::none()).unwrap();
        let payload = client
            .process(Bytes::from_static(b"pH_Sensor\n7.1\n"), "ds-1")
            .await
            .unwrap();
        assert_eq!(payload.dataset_id, "ds-1");
        assert_eq!(payload.clean_rows.len(), 1);
        assert_eq!(transport.recorded()[0].uri.to_string(), "http://ml.test/process");
    }

    #[tokio::test]
    async fn service_failure_is_status_error() {
        let transport = Arc::new(MockTransport::scripted(vec![Ok((422, "bad csv".into()))]));
        let client = MlClient::new(transport, "http://ml.test", RetryPolicy::none()).unwrap();
        let err = client.process(Bytes::new(), "x").await.unwrap_err();
        assert!(matches!(err, Error::Status { ref body, .. } if body == "bad csv"));
    }
}
