use color_eyre::Result;
use eyre::eyre;
use hyper::{Body, Request, Uri};

pub type HyperHttpClient = hyper::Client<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

pub fn mk_hyper_http_client() -> HyperHttpClient {
    // Desks serve plain http on the LAN, but allow https for setups behind a proxy
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();

    hyper::Client::builder().build(connector)
}

pub async fn mk_post_request(client: &HyperHttpClient, uri: &Uri) -> Result<()> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())?;

    let result = client.request(request).await?;
    let status = result.status();
    let body_bytes = hyper::body::to_bytes(result.into_body()).await?;

    if !status.is_success() {
        return Err(eyre!(
            "POST {} failed with {}: {}",
            uri,
            status,
            String::from_utf8_lossy(&body_bytes)
        ));
    }

    Ok(())
}
