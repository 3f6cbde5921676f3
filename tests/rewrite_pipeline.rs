//! End-to-end tests: client → gateway → mock upstream → rewritten response.

mod common;

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{single_route, start_gateway, start_static_upstream, start_upstream, UpstreamResponse};
use flate2::write::GzEncoder;
use flate2::Compression;

const JSON_FILTER: &str = r#"{ type = "json_host_rewrite" }"#;
const XML_FILTER: &str = r#"{ type = "xml_host_rewrite" }"#;

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_json_host_rewrite() {
    let upstream = start_static_upstream(UpstreamResponse::new(
        200,
        "application/json",
        r#"{"url":"http://internal.example.com/x"}"#,
    ))
    .await;
    let (gateway, shutdown) = start_gateway(&single_route(upstream, JSON_FILTER)).await;

    let res = client()
        .get(format!("http://{gateway}/layers"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert!(res.headers().get("content-length").is_none());
    assert_eq!(res.headers()["transfer-encoding"], "chunked");
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(
        res.text().await.unwrap(),
        r#"{"url":"http://public.example.com/x"}"#
    );
    shutdown.trigger();
}

#[tokio::test]
async fn test_image_passes_through_untouched() {
    let png: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 1, 2, 3];
    let upstream = start_static_upstream(
        UpstreamResponse::new(200, "image/png", png.clone()).header("ETag", "\"tile-7\""),
    )
    .await;
    let (gateway, shutdown) = start_gateway(&single_route(upstream, XML_FILTER)).await;

    let res = client()
        .get(format!("http://{gateway}/wms?request=GetMap"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-length"], png.len().to_string().as_str());
    assert_eq!(res.headers()["etag"], "\"tile-7\"");
    assert_eq!(res.bytes().await.unwrap().as_ref(), png.as_slice());
    shutdown.trigger();
}

#[tokio::test]
async fn test_html_on_xml_route_is_an_error() {
    let upstream = start_static_upstream(UpstreamResponse::new(
        200,
        "text/xml",
        "<!DOCTYPE html><html><body>Login required</body></html>",
    ))
    .await;
    let (gateway, shutdown) = start_gateway(&single_route(upstream, XML_FILTER)).await;

    let res = client()
        .get(format!("http://{gateway}/wfs"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    assert_eq!(res.headers()["cache-control"], "no-store");
    assert_eq!(res.headers()["content-type"], "application/xml; charset=utf-8");
    let body = res.text().await.unwrap();
    assert!(body.contains("<error>"));
    assert!(!body.contains("Login required"));
    shutdown.trigger();
}

#[tokio::test]
async fn test_slow_xml_parse_times_out_within_budget() {
    let mut doc = String::from("<root>");
    for i in 0..200_000 {
        doc.push_str(&format!("<f id=\"{i}\">http://internal.example.com</f>"));
    }
    doc.push_str("</root>");
    let upstream = start_static_upstream(UpstreamResponse::new(200, "application/xml", doc)).await;
    let config = format!(
        "{}\n[rewrite]\nparse_timeout_ms = 1\nmax_body_bytes = 67108864\n",
        single_route(upstream, XML_FILTER)
    );
    let (gateway, shutdown) = start_gateway(&config).await;

    let started = Instant::now();
    let res = client()
        .get(format!("http://{gateway}/wfs"))
        .send()
        .await
        .unwrap();
    let status = res.status();
    let body = res.text().await.unwrap();

    assert_eq!(status, 504);
    assert!(body.contains("<error>"));
    assert!(started.elapsed() < Duration::from_secs(5));
    shutdown.trigger();
}

#[tokio::test]
async fn test_string_replace_on_text() {
    let upstream =
        start_static_upstream(UpstreamResponse::new(200, "text/plain", "foofoobaz")).await;
    let filters = r#"{ type = "string_replace", pattern = "foo", replacement = "bar" }"#;
    let (gateway, shutdown) = start_gateway(&single_route(upstream, filters)).await;

    let res = client()
        .get(format!("http://{gateway}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "barbarbaz");
    shutdown.trigger();
}

#[tokio::test]
async fn test_gzip_upstream_is_decoded_and_sent_plain() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(br#"<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs"><a href="http://internal.example.com/f/1"/></wfs:FeatureCollection>"#)
        .unwrap();
    let gz = encoder.finish().unwrap();
    let upstream = start_static_upstream(
        UpstreamResponse::new(200, "application/gml+xml", gz).header("Content-Encoding", "gzip"),
    )
    .await;
    let (gateway, shutdown) = start_gateway(&single_route(upstream, XML_FILTER)).await;

    let res = client()
        .get(format!("http://{gateway}/wfs"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert!(res.headers().get("content-encoding").is_none());
    let body = res.text().await.unwrap();
    assert!(body.contains("http://public.example.com/f/1"));
    assert!(!body.contains("internal.example.com"));
    shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_json_gets_json_envelope() {
    let upstream =
        start_static_upstream(UpstreamResponse::new(200, "application/json", "{\"a\":")).await;
    let (gateway, shutdown) = start_gateway(&single_route(upstream, JSON_FILTER)).await;

    let res = client()
        .get(format!("http://{gateway}/api"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    assert_eq!(res.headers()["content-type"], "application/json");
    let body: serde_json::Value = serde_json::from_str(&res.text().await.unwrap()).unwrap();
    assert_eq!(body["error"]["status"], 502);
    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_status_preserved_on_rewrite() {
    let upstream = start_static_upstream(UpstreamResponse::new(
        404,
        "application/json",
        r#"{"detail":"http://internal.example.com/missing"}"#,
    ))
    .await;
    let (gateway, shutdown) = start_gateway(&single_route(upstream, JSON_FILTER)).await;

    let res = client()
        .get(format!("http://{gateway}/missing"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
    assert!(res.text().await.unwrap().contains("public.example.com"));
    shutdown.trigger();
}

#[test]
fn test_filter_after_write_order_is_rejected_at_load() {
    let config = single_route(
        "127.0.0.1:1".parse().unwrap(),
        r#"{ type = "json_host_rewrite", order = 0 }"#,
    );
    assert!(geodata_gateway::config::parse_config(&config).is_err());
}

#[tokio::test]
async fn test_forwarding_addresses_upstream() {
    let seen = Arc::new(Mutex::new(String::new()));
    let log = seen.clone();
    let upstream = start_upstream(move |head| {
        *log.lock().unwrap() = head.to_string();
        UpstreamResponse::new(200, "text/plain", "ok")
    })
    .await;
    let config = format!(
        r#"
        [[routes]]
        name = "wms"
        path_prefix = "/wms"
        strip_prefix = true
        upstream = "http://{upstream}/geoserver"
        "#
    );
    let (gateway, shutdown) = start_gateway(&config).await;

    let res = client()
        .get(format!("http://{gateway}/wms/ows?service=WMS"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-request-id"], "req-42");
    let head = seen.lock().unwrap().clone();
    assert!(head.starts_with("GET /geoserver/ows?service=WMS HTTP/1.1"));
    assert!(head.to_ascii_lowercase().contains(&format!("host: {upstream}")));
    assert!(head.contains("req-42"));
    shutdown.trigger();
}

#[tokio::test]
async fn test_request_id_generated_when_missing() {
    let upstream = start_static_upstream(UpstreamResponse::new(200, "text/plain", "ok")).await;
    let (gateway, shutdown) = start_gateway(&single_route(upstream, "")).await;

    let res = client()
        .get(format!("http://{gateway}/"))
        .send()
        .await
        .unwrap();

    let id = res.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(id.len(), 36);
    shutdown.trigger();
}

#[tokio::test]
async fn test_no_route_is_404() {
    let config = r#"
        [[routes]]
        name = "wms"
        path_prefix = "/wms"
        upstream = "http://127.0.0.1:1"
    "#;
    let (gateway, shutdown) = start_gateway(config).await;

    let res = client()
        .get(format!("http://{gateway}/elsewhere"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_down_is_502() {
    let dead = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let (gateway, shutdown) = start_gateway(&single_route(dead, JSON_FILTER)).await;

    let res = client()
        .get(format!("http://{gateway}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    shutdown.trigger();
}
