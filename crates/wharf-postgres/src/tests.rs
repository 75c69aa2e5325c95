use chrono::Duration;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use wharf_core::{LeaseStore, OwnerToken, QueueStore};

use crate::{schema, PgLeaseStore, PgQueueStore, QueueTable};

async fn seed_outbox_row(pool: &PgPool, id: Uuid, topic: &str) {
    sqlx::query(
        "INSERT INTO outbox_messages (id, topic, payload) VALUES ($1, $2, $3)",
    )
    .bind(id)
    .bind(topic)
    .bind(json!({"hello": "world"}))
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test]
async fn claim_marks_rows_in_progress_and_returns_their_ids(pool: PgPool) {
    schema::ensure_all(&pool).await.unwrap();
    let store: PgQueueStore<Uuid> = PgQueueStore::new(pool.clone(), QueueTable::Outbox, "primary");

    let id = Uuid::new_v4();
    seed_outbox_row(&pool, id, "order-placed").await;

    let owner = OwnerToken::new();
    let claimed = store.claim(owner, Duration::seconds(30), 10).await.unwrap();

    assert_eq!(claimed, vec![id]);
    assert_eq!(store.attempts(&id).await.unwrap(), 0);
}

#[sqlx::test]
async fn two_concurrent_claims_never_return_the_same_row(pool: PgPool) {
    schema::ensure_all(&pool).await.unwrap();
    let store: PgQueueStore<Uuid> = PgQueueStore::new(pool.clone(), QueueTable::Outbox, "primary");

    for _ in 0..20 {
        seed_outbox_row(&pool, Uuid::new_v4(), "order-placed").await;
    }

    let owner_a = OwnerToken::new();
    let owner_b = OwnerToken::new();

    let (claimed_a, claimed_b) = tokio::join!(
        store.claim(owner_a, Duration::seconds(30), 10),
        store.claim(owner_b, Duration::seconds(30), 10),
    );

    let claimed_a = claimed_a.unwrap();
    let claimed_b = claimed_b.unwrap();

    assert_eq!(claimed_a.len() + claimed_b.len(), 20);
    for id in &claimed_a {
        assert!(!claimed_b.contains(id), "claim sets must be disjoint");
    }
}

#[sqlx::test]
async fn ack_is_a_no_op_for_a_stale_owner(pool: PgPool) {
    schema::ensure_all(&pool).await.unwrap();
    let store: PgQueueStore<Uuid> = PgQueueStore::new(pool.clone(), QueueTable::Outbox, "primary");

    let id = Uuid::new_v4();
    seed_outbox_row(&pool, id, "order-placed").await;

    let real_owner = OwnerToken::new();
    store.claim(real_owner, Duration::seconds(30), 10).await.unwrap();

    let impostor = OwnerToken::new();
    store.ack(impostor, &[id]).await.unwrap();

    let row: (String,) = sqlx::query_as("SELECT status FROM outbox_messages WHERE id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.0, "in_progress", "a stale owner must not be able to settle someone else's claim");
}

#[sqlx::test]
async fn abandon_increments_attempts_and_restores_visibility(pool: PgPool) {
    schema::ensure_all(&pool).await.unwrap();
    let store: PgQueueStore<Uuid> = PgQueueStore::new(pool.clone(), QueueTable::Outbox, "primary");

    let id = Uuid::new_v4();
    seed_outbox_row(&pool, id, "order-placed").await;

    let owner = OwnerToken::new();
    store.claim(owner, Duration::seconds(30), 10).await.unwrap();
    store
        .abandon(owner, &[id], Some("downstream timeout".to_string()), None)
        .await
        .unwrap();

    assert_eq!(store.attempts(&id).await.unwrap(), 1);

    let reclaimed = store.claim(OwnerToken::new(), Duration::seconds(30), 10).await.unwrap();
    assert_eq!(reclaimed, vec![id]);
}

#[sqlx::test]
async fn reap_expired_reclaims_rows_whose_lease_elapsed(pool: PgPool) {
    schema::ensure_all(&pool).await.unwrap();
    let store: PgQueueStore<Uuid> = PgQueueStore::new(pool.clone(), QueueTable::Outbox, "primary");

    let id = Uuid::new_v4();
    seed_outbox_row(&pool, id, "order-placed").await;

    let owner = OwnerToken::new();
    store.claim(owner, Duration::seconds(-1), 10).await.unwrap();

    let reaped = store.reap_expired().await.unwrap();
    assert_eq!(reaped, 1);

    let reclaimed = store.claim(OwnerToken::new(), Duration::seconds(30), 10).await.unwrap();
    assert_eq!(reclaimed, vec![id]);
}

#[sqlx::test]
async fn lease_acquire_denies_a_second_holder_then_grants_after_expiry(pool: PgPool) {
    schema::ensure_all(&pool).await.unwrap();
    let store = PgLeaseStore::new(pool);

    let owner_a = OwnerToken::new();
    let first = store
        .acquire("tenant-migration", owner_a, Duration::seconds(30), None)
        .await
        .unwrap();
    assert!(first.granted);

    let owner_b = OwnerToken::new();
    let second = store
        .acquire("tenant-migration", owner_b, Duration::seconds(30), None)
        .await
        .unwrap();
    assert!(!second.granted);

    let expired_grant = store
        .acquire("tenant-migration", owner_a, Duration::seconds(-1), None)
        .await
        .unwrap();
    assert!(expired_grant.granted);

    let now_b = store
        .acquire("tenant-migration", owner_b, Duration::seconds(30), None)
        .await
        .unwrap();
    assert!(now_b.granted, "an expired lease must be acquirable by a new owner");
}

#[sqlx::test]
async fn lease_fencing_token_strictly_increases_across_renewals(pool: PgPool) {
    schema::ensure_all(&pool).await.unwrap();
    let store = PgLeaseStore::new(pool);

    let owner = OwnerToken::new();
    let first = store.acquire("singleton-worker", owner, Duration::seconds(30), None).await.unwrap();
    let second = store.renew("singleton-worker", owner, Duration::seconds(30)).await.unwrap();
    let third = store.renew("singleton-worker", owner, Duration::seconds(30)).await.unwrap();

    assert!(second.granted && third.granted);
    assert!(second.fencing_token.unwrap() > first.fencing_token.unwrap());
    assert!(third.fencing_token.unwrap() > second.fencing_token.unwrap());
}

#[sqlx::test]
async fn release_clears_ownership_so_another_owner_can_acquire(pool: PgPool) {
    schema::ensure_all(&pool).await.unwrap();
    let store = PgLeaseStore::new(pool);

    let owner_a = OwnerToken::new();
    store.acquire("nightly-rollup", owner_a, Duration::seconds(30), None).await.unwrap();
    store.release("nightly-rollup", owner_a).await.unwrap();

    let owner_b = OwnerToken::new();
    let outcome = store.acquire("nightly-rollup", owner_b, Duration::seconds(30), None).await.unwrap();
    assert!(outcome.granted);
}
