use async_trait::async_trait;
use hyper::body::{to_bytes, Bytes};
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, Response, StatusCode};
use hyper_rustls::HttpsConnector;

use crate::error::{Error, Result};

pub type HttpClient = Client<HttpsConnector<HttpConnector>>;

/// Sends a single HTTP request. Implemented by the hyper client; tests swap
/// in scripted transports.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: Request<Body>) -> Result<Response<Body>>;
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, req: Request<Body>) -> Result<Response<Body>> {
        Ok(self.request(req).await?)
    }
}

/// HTTPS client trusting the platform's native roots. Plain `http://` URLs
/// are allowed for local services.
pub fn client() -> HttpClient {
    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http);

    Client::builder().build::<_, Body>(https)
}

/// Collect a response into its status and body.
pub async fn read_body(res: Response<Body>) -> Result<(StatusCode, Bytes)> {
    let status = res.status();
    let body = to_bytes(res.into_body()).await?;
    Ok((status, body))
}

/// The body of a successful response, or [`Error::Status`] carrying the
/// body text of a failed one.
pub fn ensure_success(status: StatusCode, body: Bytes) -> Result<Bytes> {
    if status.is_success() {
        Ok(body)
    } else {
        Err(Error::Status {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}
