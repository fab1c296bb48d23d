//! Notification-cycle tests against a fresh SQLite store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rin_core::{CouponMessage, NewCoupon, RawCandidate};
use rin_db::{count_abandoned, get_coupon, insert_coupon, record_validation_result, InsertOutcome};
use rin_notifier::{DeliveryError, DiscordWebhookSink, MessageSink, Notifier, NotifyReport};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records every message and answers per code from a script (default `Ok`).
#[derive(Default)]
struct ScriptedSink {
    sent: Mutex<Vec<String>>,
    script: HashMap<&'static str, DeliveryError>,
}

#[async_trait]
impl MessageSink for ScriptedSink {
    async fn send(&self, message: &CouponMessage) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(message.code.clone());
        match self.script.get(message.code.as_str()) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

async fn seed_valid(pool: &SqlitePool, code: &str, age: Duration) -> i64 {
    let coupon = NewCoupon::from_candidate(
        "generic",
        RawCandidate {
            name: format!("Deal {code}"),
            description: String::new(),
            discount_percentage: Some(10.0),
            code: code.to_string(),
            url: format!("https://deals.example/{code}"),
            expiry: None,
        },
    );
    let id = match insert_coupon(pool, &coupon, Utc::now() - age).await.unwrap() {
        InsertOutcome::Inserted(id) => id,
        other => panic!("expected insert, got {other:?}"),
    };
    record_validation_result(pool, id, true, Utc::now())
        .await
        .unwrap();
    id
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn posts_oldest_first_and_marks_posted(pool: SqlitePool) {
    let newest = seed_valid(&pool, "NEW", Duration::minutes(1)).await;
    let oldest = seed_valid(&pool, "OLD", Duration::hours(3)).await;
    let middle = seed_valid(&pool, "MID", Duration::hours(1)).await;

    let sink = Arc::new(ScriptedSink::default());
    let report = Notifier::new(sink.clone(), 3)
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*sink.sent.lock().unwrap(), vec!["OLD", "MID", "NEW"]);
    assert_eq!(
        report,
        NotifyReport {
            pending: 3,
            posted: 3,
            failed: 0,
            abandoned: 0
        }
    );
    for id in [newest, oldest, middle] {
        assert!(get_coupon(&pool, id).await.unwrap().is_posted);
    }

    let second = Notifier::new(sink.clone(), 3)
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.pending, 0, "posted coupons are never re-sent");
}

#[sqlx::test(migrations = "../../migrations")]
async fn invalid_coupons_are_not_sent(pool: SqlitePool) {
    let id = seed_valid(&pool, "GONE", Duration::hours(1)).await;
    record_validation_result(&pool, id, false, Utc::now())
        .await
        .unwrap();

    let sink = Arc::new(ScriptedSink::default());
    Notifier::new(sink.clone(), 3)
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert!(sink.sent.lock().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn transient_failures_abandon_after_max_attempts(pool: SqlitePool) {
    let flaky = seed_valid(&pool, "FLAKY", Duration::hours(2)).await;
    let fine = seed_valid(&pool, "FINE", Duration::hours(1)).await;

    let mut script = HashMap::new();
    script.insert("FLAKY", DeliveryError::Transient("timeout".to_string()));
    let sink = Arc::new(ScriptedSink {
        script,
        ..ScriptedSink::default()
    });
    let notifier = Notifier::new(sink.clone(), 2);

    let first = notifier
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.posted, 1, "one failure does not block later coupons");
    assert_eq!(first.failed, 1);
    assert_eq!(first.abandoned, 0);
    assert!(get_coupon(&pool, fine).await.unwrap().is_posted);

    let second = notifier
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.abandoned, 1);

    let row = get_coupon(&pool, flaky).await.unwrap();
    assert!(row.is_abandoned());
    assert!(!row.is_posted);
    assert_eq!(count_abandoned(&pool).await.unwrap(), 1);

    let third = notifier
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(third.pending, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn rejected_delivery_abandons_immediately(pool: SqlitePool) {
    let id = seed_valid(&pool, "BAD", Duration::hours(1)).await;

    let mut script = HashMap::new();
    script.insert("BAD", DeliveryError::Rejected("400".to_string()));
    let sink = Arc::new(ScriptedSink {
        script,
        ..ScriptedSink::default()
    });

    let report = Notifier::new(sink, 5)
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.abandoned, 1);
    assert!(get_coupon(&pool, id).await.unwrap().is_abandoned());
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancelled_cycle_sends_nothing(pool: SqlitePool) {
    seed_valid(&pool, "WAIT", Duration::hours(1)).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let sink = Arc::new(ScriptedSink::default());
    let report = Notifier::new(sink.clone(), 3)
        .run_cycle(&pool, &cancel)
        .await
        .unwrap();

    assert_eq!(report.posted, 0);
    assert!(sink.sent.lock().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn discord_webhook_end_to_end(pool: SqlitePool) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/token"))
        .and(body_partial_json(serde_json::json!({
            "username": "RinKokonoe Coupon Bot",
            "content": "Deal OK"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/2/revoked"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let id = seed_valid(&pool, "OK", Duration::hours(1)).await;
    let sink = DiscordWebhookSink::new(&format!("{}/api/webhooks/1/token", server.uri()), 5).unwrap();
    let report = Notifier::new(Arc::new(sink), 3)
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.posted, 1);
    assert!(get_coupon(&pool, id).await.unwrap().is_posted);

    let other = seed_valid(&pool, "NOPE", Duration::minutes(5)).await;
    let revoked =
        DiscordWebhookSink::new(&format!("{}/api/webhooks/2/revoked", server.uri()), 5).unwrap();
    let report = Notifier::new(Arc::new(revoked), 3)
        .run_cycle(&pool, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.abandoned, 1);
    assert!(get_coupon(&pool, other).await.unwrap().is_abandoned());
}
