//! Facade behaviour against a scripted in-memory transport.

mod integration;

use campus_client::transport::{HttpRequest, Method, TransportError};
use campus_client::{
    ApiFamily, BearerTokenProvider, CacheClient, Error, MarkupDiagnosis, Params, RequestOptions,
    SwitchableOrigin, TenantContext,
};
use futures::future::join_all;
use integration::scripted_transport::{html, json, raw, ScriptedTransport};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const BASE: &str = "https://api.example.edu";

fn client_with(family: ApiFamily, transport: Arc<ScriptedTransport>) -> CacheClient {
    CacheClient::builder()
        .family(family)
        .base_url(BASE)
        .transport(transport)
        .ignore_env()
        .build()
        .unwrap()
}

fn tenant_opts(tenant: TenantContext) -> RequestOptions {
    RequestOptions::new().tenant(tenant)
}

/// Reads answer `{"n": <call index>}`, writes answer 201.
fn counting_transport() -> Arc<ScriptedTransport> {
    ScriptedTransport::new(|req: &HttpRequest, i| match req.method {
        Method::Get => Ok(json(200, &json!({ "n": i }))),
        _ => Ok(json(201, &json!({ "ok": true }))),
    })
}

#[tokio::test(start_paused = true)]
async fn courses_are_served_from_cache_until_ttl_expires() {
    let transport = ScriptedTransport::always(json!({"data": [{"id": 1, "name": "Algebra"}]}));
    let client = client_with(ApiFamily::general(), transport.clone());
    let params = Params::new().with("page", 1);
    let options = RequestOptions::new()
        .with_ttl(Duration::from_secs(30))
        .tenant(TenantContext::new().institute("inst-1"));

    let first = client.get_value("/courses", Some(&params), &options).await.unwrap();
    assert_eq!(first["data"][0]["name"], "Algebra");
    assert_eq!(transport.calls(), 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    let second = client.get_value("/courses", Some(&params), &options).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.calls(), 1);

    tokio::time::advance(Duration::from_secs(30)).await;
    let third = client.get_value("/courses", Some(&params), &options).await.unwrap();
    assert_eq!(transport.calls(), 2);
    assert_eq!(*third, *first);
    assert!(!Arc::ptr_eq(&first, &third));
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_reads_dispatch_once() {
    let transport = ScriptedTransport::delayed(Duration::from_millis(100), |_, _| {
        Ok(json(200, &json!([{"title": "Essay"}, {"title": "Worksheet"}])))
    });
    let client = client_with(ApiFamily::general(), transport.clone());
    let params = Params::new().with("classId", "C1");
    let options = RequestOptions::new();

    let results = join_all((0..10).map(|_| {
        let client = client.clone();
        let params = params.clone();
        let options = options.clone();
        async move { client.get_value("/homework", Some(&params), &options).await }
    }))
    .await;

    assert_eq!(transport.calls(), 1);
    let first = results[0].as_ref().unwrap();
    for r in &results {
        assert!(Arc::ptr_eq(first, r.as_ref().unwrap()));
    }
    let stats = client.stats();
    assert_eq!(stats.calls.dispatches, 1);
    assert_eq!(stats.calls.joins, 9);
    assert_eq!(stats.pending_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_reads_share_one_failure() {
    let transport = ScriptedTransport::delayed(Duration::from_millis(50), |_, _| {
        Ok(json(500, &json!({"message": "database unavailable"})))
    });
    let client = client_with(ApiFamily::general(), transport.clone());

    let results = join_all((0..5).map(|_| {
        let client = client.clone();
        async move { client.get_value("/exams", None, &RequestOptions::new()).await }
    }))
    .await;

    assert_eq!(transport.calls(), 1);
    for r in results {
        let err = r.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.to_string(), "database unavailable");
    }
}

#[tokio::test]
async fn retry_after_failure_dispatches_a_new_request() {
    let transport = ScriptedTransport::new(|_, i| {
        if i == 0 {
            Err(TransportError::Other("connection reset".into()))
        } else {
            Ok(json(200, &json!({"ok": true})))
        }
    });
    let client = client_with(ApiFamily::general(), transport.clone());

    let err = client
        .get_value("/classes", None, &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(client.stats().pending_requests, 0);

    let value = client
        .get_value("/classes", None, &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(*value, json!({"ok": true}));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn tenants_never_share_entries() {
    let transport = counting_transport();
    let client = client_with(ApiFamily::general(), transport.clone());
    let a = tenant_opts(TenantContext::new().user("A"));
    let b = tenant_opts(TenantContext::new().user("B"));

    let va = client.get_value("/x", None, &a).await.unwrap();
    let vb = client.get_value("/x", None, &b).await.unwrap();
    assert_eq!(transport.calls(), 2);
    assert_ne!(va, vb);

    let va_again = client.get_value("/x", None, &a).await.unwrap();
    assert!(Arc::ptr_eq(&va, &va_again));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn scoped_write_invalidates_reads_in_that_scope_only() {
    let transport = counting_transport();
    let client = client_with(ApiFamily::general(), transport.clone());
    let inst_i = TenantContext::new().institute("I");
    let inst_j = TenantContext::new().institute("J");

    client
        .get_value("/resource-list", None, &tenant_opts(inst_i.clone()))
        .await
        .unwrap();
    client
        .get_value("/resource-list", None, &tenant_opts(inst_j.clone()))
        .await
        .unwrap();
    assert_eq!(transport.calls_with_method("GET"), 2);

    let created: Value = client
        .post("/resource", Some(&json!({"name": "Lab"})), Some(&inst_i))
        .await
        .unwrap();
    assert_eq!(created, json!({"ok": true}));

    let refreshed = client
        .get_value("/resource-list", None, &tenant_opts(inst_i))
        .await
        .unwrap();
    assert_eq!(transport.calls_with_method("GET"), 3);
    assert_eq!(refreshed["n"], 3);

    // The other institute's entry survives.
    assert!(client.has_cache("/resource-list", None, &inst_j));
    client
        .get_value("/resource-list", None, &tenant_opts(inst_j))
        .await
        .unwrap();
    assert_eq!(transport.calls_with_method("GET"), 3);
}

#[tokio::test]
async fn scoped_write_invalidates_reads_scoped_by_query_param() {
    let transport = counting_transport();
    let client = client_with(ApiFamily::general(), transport.clone());
    let in_i = Params::new().with("instituteId", "I");
    let in_j = Params::new().with("instituteId", "J");
    let defaults = RequestOptions::new();

    let before = client
        .get_value("/resource-list", Some(&in_i), &defaults)
        .await
        .unwrap();
    client
        .get_value("/resource-list", Some(&in_j), &defaults)
        .await
        .unwrap();
    assert_eq!(transport.calls_with_method("GET"), 2);

    let _: Value = client
        .post(
            "/resource",
            Some(&json!({"name": "Lab"})),
            Some(&TenantContext::new().institute("I")),
        )
        .await
        .unwrap();

    let after = client
        .get_value("/resource-list", Some(&in_i), &defaults)
        .await
        .unwrap();
    assert_eq!(transport.calls_with_method("GET"), 3);
    assert_ne!(after, before);

    assert!(client.has_cache("/resource-list", Some(&in_j), &TenantContext::new()));
}

#[tokio::test]
async fn family_rules_decide_what_an_unscoped_write_invalidates() {
    let transport = counting_transport();
    let client = client_with(ApiFamily::general(), transport.clone());
    let class = TenantContext::new().class("C1");
    let none = TenantContext::new();

    client
        .get_value("/submissions", None, &tenant_opts(class.clone()))
        .await
        .unwrap();
    client
        .get_value("/homework", Some(&Params::new().with("classId", "C1")), &tenant_opts(none.clone()))
        .await
        .unwrap();
    client
        .get_value("/organizations", None, &tenant_opts(none.clone()))
        .await
        .unwrap();

    let _: Value = client
        .put("/homework/7", Some(&json!({"title": "Essay v2"})), None)
        .await
        .unwrap();

    assert!(!client.has_cache("/submissions", None, &class));
    assert!(!client.has_cache("/homework", Some(&Params::new().with("classId", "C1")), &none));
    assert!(client.has_cache("/organizations", None, &none));

    // No rule covers organizations: only its own family goes.
    let _: Value = client
        .delete("/organizations/3", None, None)
        .await
        .unwrap();
    assert!(!client.has_cache("/organizations", None, &none));
}

#[tokio::test]
async fn failed_write_invalidates_nothing() {
    let transport = ScriptedTransport::new(|req: &HttpRequest, _| match req.method {
        Method::Get => Ok(json(200, &json!([]))),
        _ => Ok(json(422, &json!({"error": {"message": "due date is in the past"}}))),
    });
    let client = client_with(ApiFamily::general(), transport);
    let tenant = TenantContext::new();

    client
        .get_value("/homework", None, &tenant_opts(tenant.clone()))
        .await
        .unwrap();
    let err = client
        .post::<Value>("/homework", Some(&json!({"due": "2001-01-01"})), None)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(422));
    assert_eq!(err.to_string(), "due date is in the past");
    assert!(client.has_cache("/homework", None, &tenant));
}

#[tokio::test(start_paused = true)]
async fn cooldown_serves_stale_cache_instead_of_dispatching() {
    let transport = counting_transport();
    let family = ApiFamily::general().with_cooldown(Duration::from_secs(10));
    let client = client_with(family, transport.clone());
    let options = RequestOptions::new().with_ttl(Duration::from_secs(1));

    let first = client.get_value("/subjects", None, &options).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    let during_cooldown = client.get_value("/subjects", None, &options).await.unwrap();
    assert!(Arc::ptr_eq(&first, &during_cooldown));
    assert_eq!(transport.calls(), 1);
    let stats = client.stats();
    assert_eq!(stats.calls.stale_fallbacks, 1);
    // one miss per read, the fallback itself is only a stale read
    assert_eq!(stats.cache.misses, 2);
    assert_eq!(stats.cache.hits, 0);
    assert_eq!(stats.cache.stale_reads, 1);

    tokio::time::advance(Duration::from_secs(10)).await;
    client.get_value("/subjects", None, &options).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cooldown_without_cache_is_an_explicit_rejection() {
    let transport = counting_transport();
    let client = client_with(
        ApiFamily::general().with_cache_enabled(false),
        transport.clone(),
    );

    client
        .get_value("/attendance", None, &RequestOptions::new())
        .await
        .unwrap();
    let err = client
        .get_value("/attendance", None, &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CooldownRejected { .. }));
    assert_eq!(client.stats().calls.cooldown_rejections, 1);

    tokio::time::advance(Duration::from_millis(1000)).await;
    client
        .get_value("/attendance", None, &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn upstream_failure_falls_back_to_stale_entry() {
    let responder = |_: &HttpRequest, i: usize| {
        if i == 0 {
            Ok(json(200, &json!({"classes": ["7A"]})))
        } else {
            Ok(json(503, &json!({})))
        }
    };
    let options = RequestOptions::new().with_ttl(Duration::from_secs(1));

    let transport = ScriptedTransport::new(responder);
    let client = client_with(ApiFamily::general(), transport.clone());
    let first = client.get_value("/classes", None, &options).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    let fallback = client.get_value("/classes", None, &options).await.unwrap();
    assert!(Arc::ptr_eq(&first, &fallback));
    assert_eq!(transport.calls(), 2);

    let strict = client_with(
        ApiFamily::general().with_stale_on_error(false),
        ScriptedTransport::new(responder),
    );
    strict.get_value("/classes", None, &options).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    let err = strict.get_value("/classes", None, &options).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_never_masked_by_stale_data() {
    let transport = ScriptedTransport::new(|_, i| {
        if i == 0 {
            Ok(json(200, &json!({"id": 9})))
        } else {
            Ok(json(404, &json!({"detail": "Class not found"})))
        }
    });
    let client = client_with(ApiFamily::general(), transport);
    let options = RequestOptions::new().with_ttl(Duration::from_secs(1));

    client.get_value("/classes/9", None, &options).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    let err = client.get_value("/classes/9", None, &options).await.unwrap_err();
    assert_eq!(err.to_string(), "Class not found");
}

#[tokio::test]
async fn unauthorized_response_clears_credentials() {
    let transport = ScriptedTransport::new(|_, _| {
        Ok(json(401, &json!({"message": "Session expired"})))
    });
    let token = Arc::new(BearerTokenProvider::new("stale-token"));
    let client = CacheClient::builder()
        .base_url(BASE)
        .header_provider(token.clone())
        .transport(transport.clone())
        .ignore_env()
        .build()
        .unwrap();

    let err = client
        .get_value("/institutes", None, &RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.to_string(), "Session expired");
    assert!(token.token().is_none());
    assert_eq!(
        transport.last_request().unwrap().header("authorization"),
        Some("Bearer stale-token")
    );
}

#[tokio::test]
async fn markup_and_malformed_bodies_are_classified() {
    let transport = ScriptedTransport::new(|req: &HttpRequest, _| {
        if req.url.path() == "/tunnel" {
            Ok(html(
                200,
                "<!DOCTYPE html><html><body>You are about to visit this site (ngrok)</body></html>",
            ))
        } else {
            Ok(raw(200, "application/json", "{\"items\": [1, 2"))
        }
    });
    let client = client_with(ApiFamily::general(), transport);

    match client.get_value("/tunnel", None, &RequestOptions::new()).await {
        Err(Error::UnexpectedContentType { diagnosis, .. }) => {
            assert_eq!(diagnosis, MarkupDiagnosis::InterceptedByProxy)
        }
        other => panic!("expected markup error, got {other:?}"),
    }
    let err = client
        .get_value("/broken", None, &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
}

#[tokio::test]
async fn missing_origin_fails_fast_without_network() {
    let transport = counting_transport();
    let client = CacheClient::builder()
        .transport(transport.clone())
        .ignore_env()
        .build()
        .unwrap();

    for _ in 0..2 {
        let err = client
            .get_value("/classes", None, &RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }), "{err:?}");
    }
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn origin_is_resolved_on_every_call() {
    let transport = counting_transport();
    let origins = Arc::new(SwitchableOrigin::new("https://a.example.edu", ""));
    let general = CacheClient::builder()
        .origin_resolver(origins.clone())
        .transport(transport.clone())
        .ignore_env()
        .build()
        .unwrap();
    let attendance = CacheClient::builder()
        .family(ApiFamily::attendance())
        .origin_resolver(origins.clone())
        .transport(transport.clone())
        .ignore_env()
        .build()
        .unwrap();

    general.get_value("/classes", None, &RequestOptions::new()).await.unwrap();
    assert_eq!(transport.last_request().unwrap().url.host_str(), Some("a.example.edu"));

    origins.set_primary("https://b.example.edu");
    general.get_value("/subjects", None, &RequestOptions::new()).await.unwrap();
    assert_eq!(transport.last_request().unwrap().url.host_str(), Some("b.example.edu"));

    let calls = transport.calls();
    let err = attendance
        .get_value("/attendance", None, &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }), "{err:?}");
    assert_eq!(transport.calls(), calls);

    origins.set_secondary("https://att.example.edu");
    attendance
        .get_value("/attendance/today", None, &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(transport.last_request().unwrap().url.host_str(), Some("att.example.edu"));
}

#[tokio::test]
async fn secondary_family_without_secondary_origin_fails_fast() {
    let transport = counting_transport();
    let client = CacheClient::builder()
        .family(ApiFamily::attendance())
        .origin_resolver(Arc::new(SwitchableOrigin::new("https://main.example", "")))
        .transport(transport.clone())
        .ignore_env()
        .build()
        .unwrap();

    let err = client
        .get_value("/attendance", None, &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }), "{err:?}");
    assert_eq!(transport.calls(), 0);
    assert!(!client.has_cache("/attendance", None, &TenantContext::new()));
}

#[tokio::test(start_paused = true)]
async fn cache_probes_never_touch_the_network() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Page {
        n: u64,
    }

    let transport = counting_transport();
    let client = client_with(ApiFamily::general(), transport.clone());
    let tenant = TenantContext::new().user("u1");
    let options = tenant_opts(tenant.clone()).with_ttl(Duration::from_secs(10));

    assert!(!client.has_cache("/classes", None, &tenant));
    assert_eq!(client.get_cached_only::<Page>("/classes", None, &tenant).unwrap(), None);

    client.get_value("/classes", None, &options).await.unwrap();
    assert!(client.has_cache("/classes", None, &tenant));
    assert_eq!(
        client.get_cached_only::<Page>("/classes", None, &tenant).unwrap(),
        Some(Page { n: 0 })
    );

    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(client.has_cache("/classes", None, &tenant));
    assert_eq!(client.get_cached_only::<Page>("/classes", None, &tenant).unwrap(), None);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn preload_warms_the_cache_and_swallows_errors() {
    let transport = ScriptedTransport::new(|req: &HttpRequest, _| {
        if req.url.path() == "/down" {
            Ok(json(500, &json!({})))
        } else {
            Ok(json(200, &json!(["Physics"])))
        }
    });
    let client = client_with(ApiFamily::general(), transport.clone());

    client.preload("/subjects", None, &RequestOptions::new()).await;
    client.preload("/down", None, &RequestOptions::new()).await;
    assert_eq!(transport.calls(), 2);

    let subjects: Vec<String> = client
        .get("/subjects", None, &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(subjects, vec!["Physics".to_string()]);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn clearing_pending_requests_lets_the_next_caller_dispatch() {
    let transport = ScriptedTransport::delayed(Duration::from_millis(100), |_, i| {
        Ok(json(200, &json!({ "n": i })))
    });
    let client = client_with(ApiFamily::general(), transport.clone());

    let background = tokio::spawn({
        let client = client.clone();
        async move { client.get_value("/students", None, &RequestOptions::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(client.stats().pending_requests, 1);

    client.clear_pending_requests();
    assert_eq!(client.stats().pending_requests, 0);

    let fresh = client
        .get_value("/students", None, &RequestOptions::new())
        .await
        .unwrap();
    let old = background.await.unwrap().unwrap();
    assert_eq!(transport.calls(), 2);
    assert_eq!(old["n"], 0);
    assert_eq!(fresh["n"], 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_read_still_populates_the_cache() {
    let transport = ScriptedTransport::delayed(Duration::from_millis(50), |_, _| {
        Ok(json(200, &json!({"institute": "North"})))
    });
    let client = client_with(ApiFamily::general(), transport.clone());
    let options = RequestOptions::new();

    let gave_up = tokio::time::timeout(
        Duration::from_millis(10),
        client.get_value("/institutes/1", None, &options),
    )
    .await;
    assert!(gave_up.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.has_cache("/institutes/1", None, &TenantContext::new()));
    let value = client.get_value("/institutes/1", None, &options).await.unwrap();
    assert_eq!(value["institute"], "North");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn disposed_client_refuses_work() {
    let transport = counting_transport();
    let client = client_with(ApiFamily::general(), transport.clone());
    client.get_value("/classes", None, &RequestOptions::new()).await.unwrap();

    client.dispose();
    assert!(client.is_disposed());
    assert!(!client.has_cache("/classes", None, &TenantContext::new()));
    let err = client
        .get_value("/classes", None, &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Runtime { .. }));
    assert!(client.post::<Value>("/classes", None, None).await.is_err());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_while_revalidate_serves_stale_and_refreshes_in_background() {
    let transport = counting_transport();
    let client = client_with(ApiFamily::enhanced(), transport.clone());
    let options = RequestOptions::new().with_ttl(Duration::from_secs(1));

    let first = client.get_value("/organizations", None, &options).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    let served = client.get_value("/organizations", None, &options).await.unwrap();
    assert!(Arc::ptr_eq(&first, &served));

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(transport.calls(), 2);
    assert_eq!(client.stats().calls.background_refreshes, 1);

    let refreshed = client.get_value("/organizations", None, &options).await.unwrap();
    assert_eq!(refreshed["n"], 1);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn write_during_pending_read_keeps_old_response_out_of_cache() {
    let transport = ScriptedTransport::delayed_by(
        |req: &HttpRequest| match req.method {
            Method::Get => Duration::from_millis(200),
            _ => Duration::ZERO,
        },
        |req: &HttpRequest, i| match req.method {
            Method::Get => Ok(json(200, &json!({ "n": i }))),
            _ => Ok(json(204, &Value::Null)),
        },
    );
    let client = client_with(ApiFamily::general(), transport.clone());

    let read = tokio::spawn({
        let client = client.clone();
        async move { client.get_value("/exams", None, &RequestOptions::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let _: Value = client
        .patch("/exams/4", Some(&json!({"room": "B2"})), None)
        .await
        .unwrap();

    let old = read.await.unwrap().unwrap();
    assert_eq!(old["n"], 0);
    assert!(!client.has_cache("/exams", None, &TenantContext::new()));

    let fresh = client
        .get_value("/exams", None, &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(fresh["n"], 2);
    assert_eq!(transport.calls_with_method("GET"), 2);
}

#[tokio::test(start_paused = true)]
async fn force_refresh_bypasses_a_fresh_entry() {
    let transport = counting_transport();
    let client = client_with(ApiFamily::general(), transport.clone());

    client.get_value("/classes", None, &RequestOptions::new()).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    let refreshed = client
        .get_value("/classes", None, &RequestOptions::new().force_refresh(true))
        .await
        .unwrap();
    assert_eq!(refreshed["n"], 1);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn typed_reads_report_shape_mismatches() {
    #[derive(Debug, Deserialize)]
    struct Exam {
        #[allow(dead_code)]
        id: u32,
    }

    let transport = ScriptedTransport::always(json!({"id": "not-a-number"}));
    let client = client_with(ApiFamily::general(), transport);
    let err = client
        .get::<Exam>("/exams/1", None, &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
}

#[tokio::test]
async fn explicit_invalidation_and_clear() {
    let transport = counting_transport();
    let client = client_with(ApiFamily::general(), transport.clone());
    let u1 = TenantContext::new().user("u1");
    let u2 = TenantContext::new().user("u2");

    for tenant in [&u1, &u2] {
        client
            .get_value("/homework/1", None, &tenant_opts(tenant.clone()))
            .await
            .unwrap();
    }
    assert_eq!(client.invalidate("/homework", Some(&TenantContext::new().user("u1"))), 1);
    assert!(!client.has_cache("/homework/1", None, &u1));
    assert!(client.has_cache("/homework/1", None, &u2));

    client.clear_cache();
    assert_eq!(client.stats().cached_entries, 0);
}
