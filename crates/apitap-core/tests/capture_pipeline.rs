use apitap_core::har::{Har, UNKNOWN_SIZE};
use apitap_core::{BufferSink, Client, Config, Controller, Envelope, TeeBody, DROPPED_BODY_TEXT};
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;
use std::time::Duration;
use tower::{service_fn, Service, ServiceBuilder, ServiceExt};

type ReqBody = TeeBody<Full<Bytes>>;

fn buffered_client(config: Config) -> (Client, BufferSink) {
    let sink = BufferSink::new();
    let client = Client::with_sink(config, sink.clone());
    (client, sink)
}

// Delivery happens on a detached task, so poll until the envelope lands.
async fn next_envelope(sink: &BufferSink) -> Envelope {
    for _ in 0..200 {
        if let Some(envelope) = sink.take().into_iter().next() {
            return envelope;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no envelope delivered");
}

fn parse_har(envelope: &Envelope) -> Har {
    serde_json::from_str(&envelope.har).expect("delivered record is valid HAR JSON")
}

async fn echo(req: Request<ReqBody>) -> Result<Response<Full<Bytes>>, Infallible> {
    let body = req.into_body().collect().await.unwrap().to_bytes();
    Ok(Response::builder()
        .header("content-type", "application/json")
        .body(Full::new(body))
        .unwrap())
}

#[tokio::test]
async fn test_record_reflects_live_exchange() {
    let (client, sink) = buffered_client(Config::new("k").api_id("orders"));
    let service = ServiceBuilder::new()
        .layer(client.layer())
        .service(service_fn(echo));

    let request = Request::builder()
        .method("POST")
        .uri("/orders?limit=5")
        .header("host", "api.internal:8080")
        .header("accept", "application/json")
        .body(Full::new(Bytes::from_static(b"{\"total\": 9}")))
        .unwrap();
    let response = service.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"{\"total\": 9}");

    let envelope = next_envelope(&sink).await;
    let har = parse_har(&envelope);
    assert_eq!(har.log.version, "1.2");
    assert_eq!(har.log.creator.name, "apitap");
    assert_eq!(har.log.entries.len(), 1);

    let entry = &har.log.entries[0];
    assert_eq!(entry.request.method, "POST");
    assert_eq!(entry.request.url, "http://api.internal:8080/orders?limit=5");
    assert_eq!(entry.connection.as_deref(), Some("8080"));
    assert_eq!(entry.server_ip_address.as_deref(), Some("api.internal"));
    assert_eq!(entry.request.body_size, 12);
    assert_eq!(
        entry.request.post_data.as_ref().unwrap().text,
        "{\"total\": 9}"
    );
    assert_eq!(entry.response.status, 200);
    assert_eq!(entry.response.content.text, "{\"total\": 9}");
    assert_eq!(entry.response.body_size, 12);
    assert_eq!(entry.timings.send, -1.0);
    assert!(entry.time >= 0.0);
}

#[tokio::test]
async fn test_capture_budget_boundary() {
    let (client, sink) = buffered_client(Config::new("k").max_capture_size(32));
    let mut service = ServiceBuilder::new()
        .layer(client.layer())
        .service(service_fn(echo));

    // Exactly at the budget: kept.
    let request = Request::builder()
        .method("POST")
        .uri("/fits")
        .body(Full::new(Bytes::from(vec![b'a'; 32])))
        .unwrap();
    let response = service.ready().await.unwrap().call(request).await.unwrap();
    let _ = response.into_body().collect().await.unwrap();

    let har = parse_har(&next_envelope(&sink).await);
    let entry = &har.log.entries[0];
    assert_eq!(entry.request.post_data.as_ref().unwrap().text.len(), 32);
    assert_eq!(entry.request.body_size, 32);
    // The budget is shared, so the echoed copy no longer fits.
    assert_eq!(entry.response.content.text, DROPPED_BODY_TEXT);

    // One byte past the budget: replaced by the sentinel, wire size kept.
    let request = Request::builder()
        .method("POST")
        .uri("/spills")
        .body(Full::new(Bytes::from(vec![b'b'; 33])))
        .unwrap();
    let response = service.ready().await.unwrap().call(request).await.unwrap();
    let _ = response.into_body().collect().await.unwrap();

    let har = parse_har(&next_envelope(&sink).await);
    let entry = &har.log.entries[0];
    assert_eq!(
        entry.request.post_data.as_ref().unwrap().text,
        DROPPED_BODY_TEXT
    );
    assert_eq!(entry.request.body_size, 33);
    // The echoed 33 bytes overflow the response side as well.
    assert_eq!(entry.response.content.text, DROPPED_BODY_TEXT);
    assert_eq!(entry.response.content.size, UNKNOWN_SIZE);
    assert_eq!(entry.response.body_size, 33);
}

#[tokio::test]
async fn test_masks_apply_across_categories() {
    let (client, sink) = buffered_client(Config::new("k"));
    let service = ServiceBuilder::new().layer(client.layer()).service(service_fn(
        |req: Request<ReqBody>| async move {
            if let Some(controller) = Controller::from_extensions(req.extensions()) {
                controller.mask_query_strings(["token"], &[]);
                controller.mask_request_headers(["Authorization"], &[]);
                controller.mask_response_cookies(["session"], &[]);
                controller.mask_request_string_fields(["card"], &["XXXX"]);
                controller.mask_response_string_fields(["card"], &["XXXX"]);
            }
            let body = req.into_body().collect().await.unwrap().to_bytes();
            Ok::<_, Infallible>(
                Response::builder()
                    .header("set-cookie", "session=top-secret; Path=/")
                    .header("content-type", "application/json")
                    .body(Full::new(body))
                    .unwrap(),
            )
        },
    ));

    let request = Request::builder()
        .method("POST")
        .uri("/pay?token=hunter2&limit=1")
        .header("host", "svc")
        .header("authorization", "Bearer hunter2")
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from_static(b"{\"card\": \"4242\"}")))
        .unwrap();
    let response = service.oneshot(request).await.unwrap();
    let _ = response.into_body().collect().await.unwrap();

    let envelope = next_envelope(&sink).await;
    let har = parse_har(&envelope);
    let entry = &har.log.entries[0];

    assert_eq!(entry.request.url, "http://svc/pay?token=__masked__&limit=1");
    let auth = entry
        .request
        .headers
        .iter()
        .find(|pair| pair.name == "authorization")
        .unwrap();
    assert_eq!(auth.value, "__masked__");
    assert_eq!(entry.request.post_data.as_ref().unwrap().text, "{\"card\": \"XXXX\"}");
    assert_eq!(entry.response.content.text, "{\"card\": \"XXXX\"}");
    let session = entry
        .response
        .cookies
        .iter()
        .find(|cookie| cookie.name == "session")
        .unwrap();
    assert_eq!(session.value, "__masked__");

    // Metadata carries key names only, never the replaced values.
    assert_eq!(envelope.masking_metadata.query_string_masks, vec!["token"]);
    assert_eq!(
        envelope.masking_metadata.request_header_masks,
        vec!["authorization"]
    );
    assert_eq!(
        envelope.masking_metadata.request_field_masks_string,
        vec!["card"]
    );
    assert_eq!(
        envelope.masking_metadata.response_field_masks_string,
        vec!["card"]
    );
    assert!(!envelope.har.contains("hunter2"));
    assert!(!envelope.har.contains("4242"));
}

#[tokio::test]
async fn test_not_modified_body_size_zeroed() {
    let (client, sink) = buffered_client(Config::new("k"));
    let service = ServiceBuilder::new().layer(client.layer()).service(service_fn(
        |_req: Request<ReqBody>| async move {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(StatusCode::NOT_MODIFIED)
                    .body(Full::new(Bytes::new()))
                    .unwrap(),
            )
        },
    ));

    let request = Request::builder().uri("/cached").body(Full::new(Bytes::new())).unwrap();
    let response = service.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    let _ = response.into_body().collect().await.unwrap();

    let har = parse_har(&next_envelope(&sink).await);
    let entry = &har.log.entries[0];
    assert_eq!(entry.response.status, 304);
    assert_eq!(entry.response.body_size, 0);
    assert_eq!(entry.response.content.text, "");
}

#[tokio::test]
async fn test_forwarded_headers_resolve_public_url() {
    let (client, sink) = buffered_client(Config::new("k"));
    let service = ServiceBuilder::new()
        .layer(client.layer())
        .service(service_fn(echo));

    let request = Request::builder()
        .uri("/orders")
        .header("host", "pod-7:3000")
        .header("x-forwarded-proto", "https")
        .header("x-forwarded-host", "api.example.com")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = service.oneshot(request).await.unwrap();
    let _ = response.into_body().collect().await.unwrap();

    let har = parse_har(&next_envelope(&sink).await);
    assert_eq!(
        har.log.entries[0].request.url,
        "https://api.example.com/orders"
    );
    assert_eq!(
        har.log.comment,
        "request capture for https://api.example.com/orders"
    );
}
