//! Validation-cycle tests against a fresh SQLite store and a local
//! `wiremock` server standing in for coupon pages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rin_core::{NewCoupon, RawCandidate};
use rin_db::{get_coupon, insert_coupon, record_validation_result, CouponRow, InsertOutcome};
use rin_validator::{
    BreakerState, CheckRegistry, ProbeOutcome, SourceBreaker, ValidationReport, ValidityCheck,
    Validator, ValidatorConfig,
};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(unknown_threshold: u32) -> ValidatorConfig {
    ValidatorConfig {
        max_concurrent: 1,
        probe_timeout: Duration::from_secs(5),
        staleness: chrono::Duration::hours(24),
        unknown_threshold,
    }
}

fn validator(unknown_threshold: u32, breaker: SourceBreaker) -> Validator {
    Validator::new(
        CheckRegistry::new(),
        breaker,
        Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap(),
        config(unknown_threshold),
    )
}

/// Always valid; records how many checks overlap at once.
#[derive(Default)]
struct GaugedCheck {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ValidityCheck for GaugedCheck {
    async fn check(&self, _coupon: &CouponRow, _client: &Client) -> ProbeOutcome {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        ProbeOutcome::Valid
    }
}

async fn mount(server: &MockServer, route: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

async fn seed(pool: &SqlitePool, source: &str, code: &str, url: String) -> i64 {
    let coupon = NewCoupon::from_candidate(
        source,
        RawCandidate {
            name: format!("{source} {code}"),
            description: String::new(),
            discount_percentage: None,
            code: code.to_string(),
            url,
            expiry: None,
        },
    );
    match insert_coupon(pool, &coupon, Utc::now()).await.unwrap() {
        InsertOutcome::Inserted(id) => id,
        other => panic!("expected insert, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn live_and_dead_pages_get_definitive_verdicts(pool: SqlitePool) {
    let server = MockServer::start().await;
    mount(&server, "/live", 200, "<p>Deal is on</p>").await;
    mount(&server, "/dead", 404, "").await;

    let live = seed(&pool, "generic", "LIVE", format!("{}/live", server.uri())).await;
    let dead = seed(&pool, "generic", "DEAD", format!("{}/dead", server.uri())).await;

    let report = validator(3, SourceBreaker::new(10, 0))
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.due, 2);
    assert_eq!(report.valid, 1);
    assert_eq!(report.invalid, 1);

    let live = get_coupon(&pool, live).await.unwrap();
    assert!(live.is_valid);
    assert!(live.validated_at.is_some());
    let dead = get_coupon(&pool, dead).await.unwrap();
    assert!(!dead.is_valid);
    assert!(dead.validated_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn valid_row_survives_until_unknown_threshold(pool: SqlitePool) {
    let server = MockServer::start().await;
    mount(&server, "/flaky", 503, "").await;

    let id = seed(&pool, "generic", "FLAKY", format!("{}/flaky", server.uri())).await;
    record_validation_result(&pool, id, true, Utc::now() - chrono::Duration::days(2))
        .await
        .unwrap();

    // Force re-validation every cycle by treating everything as stale.
    let mut cfg = config(3);
    cfg.staleness = chrono::Duration::zero();
    let validator = Validator::new(
        CheckRegistry::new(),
        SourceBreaker::new(10, 0),
        Client::new(),
        cfg,
    );

    for cycle in 1..=2 {
        let report = validator
            .run_cycle(&pool, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.unknown, 1, "cycle {cycle}");
        assert!(get_coupon(&pool, id).await.unwrap().is_valid, "cycle {cycle}");
    }

    let report = validator
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.downgraded, 1);

    let row = get_coupon(&pool, id).await.unwrap();
    assert!(!row.is_valid);
    assert_eq!(row.consecutive_unknowns, 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn breaker_skips_failing_source_for_cooldown(pool: SqlitePool) {
    let server = MockServer::start().await;
    mount(&server, "/down", 503, "").await;
    mount(&server, "/up", 200, "ok").await;

    for code in ["D1", "D2", "D3"] {
        seed(&pool, "flaky", code, format!("{}/down?c={code}", server.uri())).await;
    }
    let healthy = seed(&pool, "steady", "S1", format!("{}/up", server.uri())).await;

    let validator = validator(100, SourceBreaker::new(2, 1));

    let first = validator
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        first,
        ValidationReport {
            due: 4,
            valid: 1,
            unknown: 2,
            skipped: 1,
            ..ValidationReport::default()
        }
    );
    assert!(get_coupon(&pool, healthy).await.unwrap().is_valid);

    // Cooldown cycle: every flaky row skipped.
    let second = validator
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.skipped, 3);
    assert_eq!(second.unknown, 0);

    // Half-open: one failure re-trips, the remaining rows are skipped again.
    let third = validator
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(third.unknown, 1);
    assert_eq!(third.skipped, 2);
    assert!(matches!(
        validator.breaker().state("flaky"),
        BreakerState::Open { .. }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn soft_expired_coupon_with_live_page_is_revived(pool: SqlitePool) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Deal still on"))
        .expect(1)
        .mount(&server)
        .await;

    let mut coupon = NewCoupon::from_candidate(
        "generic",
        RawCandidate {
            name: "old".to_string(),
            description: String::new(),
            discount_percentage: None,
            code: "OLD".to_string(),
            url: format!("{}/old", server.uri()),
            expiry: None,
        },
    );
    coupon.expiry = Some(Utc::now() - chrono::Duration::days(1));
    let InsertOutcome::Inserted(id) = insert_coupon(&pool, &coupon, Utc::now()).await.unwrap()
    else {
        panic!("expected a fresh insert");
    };
    record_validation_result(&pool, id, false, Utc::now() - chrono::Duration::days(2))
        .await
        .unwrap();

    let report = validator(3, SourceBreaker::new(5, 2))
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.valid, 1);
    assert_eq!(report.invalid, 0);
    assert!(get_coupon(&pool, id).await.unwrap().is_valid);
}

#[sqlx::test(migrations = "../../migrations")]
async fn slow_page_counts_as_unknown_and_keeps_the_verdict(pool: SqlitePool) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("on")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let id = seed(&pool, "generic", "SLOW", format!("{}/slow", server.uri())).await;
    record_validation_result(&pool, id, true, Utc::now() - chrono::Duration::days(2))
        .await
        .unwrap();

    let mut cfg = config(3);
    cfg.probe_timeout = Duration::from_millis(200);
    let report = Validator::new(
        CheckRegistry::new(),
        SourceBreaker::new(10, 0),
        Client::new(),
        cfg,
    )
    .run_cycle(&pool, &CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(report.unknown, 1);
    assert_eq!(report.downgraded, 0);
    let row = get_coupon(&pool, id).await.unwrap();
    assert!(row.is_valid);
    assert_eq!(row.consecutive_unknowns, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn checks_run_at_most_max_concurrent_at_once(pool: SqlitePool) {
    let gauge = Arc::new(GaugedCheck::default());
    let mut checks = CheckRegistry::new();
    checks.register("gauged", Arc::clone(&gauge) as Arc<dyn ValidityCheck>);

    for i in 0..6 {
        seed(&pool, "gauged", &format!("G{i}"), format!("https://gauged.example/{i}")).await;
    }

    let mut cfg = config(3);
    cfg.max_concurrent = 2;
    let report = Validator::new(checks, SourceBreaker::new(10, 0), Client::new(), cfg)
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.valid, 6);
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency was {peak}");
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancelled_cycle_leaves_rows_untouched(pool: SqlitePool) {
    let id = seed(&pool, "generic", "X", "http://127.0.0.1:9/x".to_string()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = validator(3, SourceBreaker::new(5, 2))
        .run_cycle(&pool, &cancel)
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert!(get_coupon(&pool, id).await.unwrap().validated_at.is_none());
}
