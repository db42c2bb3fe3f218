use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use gateway_core::{finalize_billing, AuthAdapter, DidHeaderAuth, RequestContext, UpstreamClient};
use gateway_pricing::{PricingRegistry, PricingSnapshot};
use gateway_provider_core::{
    Headers, HttpMethod, ProviderConfig, UpstreamBody, UpstreamFailure, UpstreamHttpRequest,
    UpstreamHttpResponse, UpstreamProvider,
};
use gateway_providers::OpenAiProvider;

/// Stands in for `gateway_core::WreqUpstreamClient`: same trait, no socket.
/// Always answers with a canned buffered body, so the rest of the pipeline
/// (auth, provider driver, usage extraction, pricing, billing) can be
/// exercised end to end without a live upstream.
struct MockUpstream {
    status: u16,
    body: &'static [u8],
}

impl UpstreamClient for MockUpstream {
    fn send<'a>(
        &'a self,
        _req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            Ok(UpstreamHttpResponse {
                status: self.status,
                headers: Vec::new(),
                body: UpstreamBody::Bytes(Bytes::from_static(self.body)),
            })
        })
    }
}

fn did_auth_header(did: &str, key_id: &str) -> String {
    let payload = format!(r#"{{"did":"{did}","keyId":"{key_id}"}}"#);
    format!("DIDAuthV1 u{}", URL_SAFE_NO_PAD.encode(payload))
}

#[tokio::test]
async fn non_stream_request_is_authenticated_billed_and_logged_through_a_mock_upstream() {
    let headers: Headers = vec![(
        "authorization".to_string(),
        did_auth_header("did:key:z6Mktest", "key-1"),
    )];
    let did = DidHeaderAuth.authenticate(&headers).unwrap();

    let mut ctx = RequestContext::new("POST", "/v1/chat/completions", &headers);
    ctx.did = Some(did);
    ctx.model = Some("gpt-4".to_string());
    ctx.provider = Some("openai".to_string());

    let driver = OpenAiProvider;
    let config = ProviderConfig::new(
        "openai",
        "https://api.openai.com",
        true,
        Some("sk-test".into()),
        false,
        driver.supported_paths().iter().map(|p| p.to_string()),
    )
    .unwrap();
    let upstream_request = driver
        .build_upstream_request(&config, "/v1/chat/completions", HttpMethod::Post, None, false)
        .unwrap();
    assert_eq!(upstream_request.url, "https://api.openai.com/v1/chat/completions");

    let upstream: Arc<dyn UpstreamClient> = Arc::new(MockUpstream {
        status: 200,
        body: br#"{"usage":{"prompt_tokens":100,"completion_tokens":50,"total_tokens":150}}"#,
    });
    let response = upstream.send(upstream_request).await.unwrap();
    assert_eq!(response.status, 200);
    let UpstreamBody::Bytes(body) = response.body else {
        panic!("mock upstream always returns a buffered body");
    };

    let usage = driver.create_usage_extractor().extract_non_stream(&body);
    assert_eq!(usage.unwrap().total_tokens, 150);

    let pricing = PricingRegistry::new(PricingSnapshot::with_defaults(1.0, None));
    let cost = pricing.calculate_request_cost(driver.key(), "gpt-4", None, usage);
    assert!(cost.is_some());

    let billing = finalize_billing(&ctx, usage, cost);
    assert_eq!(billing.usage, usage);
    assert!(billing.billing_pico_usd > 0);

    // finalize_billing latches per request; a second call for the same
    // context must not double-bill even if some retry path calls it again.
    let second = finalize_billing(&ctx, usage, billing.cost.clone());
    assert_eq!(second.billing_pico_usd, 0);
}

#[tokio::test]
async fn non_2xx_upstream_status_is_not_treated_as_a_transport_failure() {
    let upstream: Arc<dyn UpstreamClient> = Arc::new(MockUpstream {
        status: 429,
        body: br#"{"error":{"message":"rate limited"}}"#,
    });
    let req = UpstreamHttpRequest {
        method: HttpMethod::Post,
        url: "https://api.openai.com/v1/chat/completions".to_string(),
        headers: Vec::new(),
        body: None,
        is_stream: false,
    };
    let response = upstream.send(req).await.unwrap();
    assert_eq!(response.status, 429);
}
