//! End-to-end engine scenarios against the in-memory catalog: discovery,
//! cross-platform dedup, closure lifecycle, and incremental review sync.

use std::sync::Arc;

use placematch_catalog::testutil::MemoryCatalog;
use placematch_catalog::{CatalogStore, NewVenue};
use placematch_common::{CatalogError, MatcherConfig, Platform, VenueStatus};
use placematch_engine::testing::{crawled_review, record, MockCrawler};
use placematch_engine::{
    shutdown_channel, Crawler, DiscoveryRunner, LifecycleValidator, MatchRule, Pacing,
    ReconcileAction, Reconciler, ReviewSyncer,
};

fn setup() -> (Arc<MemoryCatalog>, Arc<dyn CatalogStore>) {
    let mem = Arc::new(MemoryCatalog::new());
    let store: Arc<dyn CatalogStore> = mem.clone();
    (mem, store)
}

fn reconciler(store: Arc<dyn CatalogStore>) -> Reconciler {
    Reconciler::new(store, MatcherConfig::default())
}

#[tokio::test]
async fn reconciling_the_same_record_twice_keeps_one_venue() {
    let (mem, store) = setup();
    let reconciler = reconciler(store.clone());

    let mut r = record(Platform::KakaoMap, "k-100", "Fritz Coffee", "서울 마포구 양화로 68");
    r.phone = Some("02-3275-1045".into());
    r.latitude = Some(37.5480);
    r.longitude = Some(126.9180);

    let first = reconciler.reconcile(&r).await.unwrap();
    assert_eq!(first.action, ReconcileAction::Created);
    assert_eq!(first.venue.status, VenueStatus::New);

    let second = reconciler.reconcile(&r).await.unwrap();
    assert_eq!(second.action, ReconcileAction::UpdatedIdentity);
    assert_eq!(second.rule, Some(MatchRule::PlatformIdentity));
    assert_eq!(second.venue.id, first.venue.id);
    assert!(second.venue.last_synced_at >= first.venue.last_synced_at);

    assert_eq!(mem.venue_count(), 1);
    let snapshots = store.snapshots_for_venue(first.venue.id).await.unwrap();
    assert_eq!(snapshots.len(), 1);
}

#[tokio::test]
async fn close_similar_record_from_another_platform_attaches_a_snapshot() {
    let (mem, store) = setup();
    let reconciler = reconciler(store.clone());

    let mut kakao = record(Platform::KakaoMap, "k-1", "Blue Bottle Cafe", "서울 성수동 1-1");
    kakao.latitude = Some(37.5000);
    kakao.longitude = Some(127.0000);
    let created = reconciler.reconcile(&kakao).await.unwrap();
    assert_eq!(created.action, ReconcileAction::Created);

    let mut naver = record(Platform::NaverMap, "n-9", "Blue Bottle Caffe", "성수동 1-1");
    naver.latitude = Some(37.5001);
    naver.longitude = Some(127.0001);
    naver.phone = Some("02-1234-5678".into());

    let attached = reconciler.reconcile(&naver).await.unwrap();
    assert_eq!(attached.action, ReconcileAction::AttachedSnapshot);
    assert_eq!(attached.rule, Some(MatchRule::GeoName));
    assert_eq!(attached.venue.id, created.venue.id);
    assert_eq!(mem.venue_count(), 1);

    // Secondary platform fills the phone gap but the primary name stays.
    assert_eq!(attached.venue.name, "Blue Bottle Cafe");
    assert_eq!(attached.venue.phone, "02-1234-5678");

    let snapshots = store.snapshots_for_venue(created.venue.id).await.unwrap();
    assert_eq!(snapshots.len(), 2);
}

#[tokio::test]
async fn name_similarity_threshold_is_configurable() {
    let (mem, store) = setup();
    let lenient = Reconciler::new(
        store.clone(),
        MatcherConfig {
            max_distance_m: 50.0,
            min_name_similarity: 0.6,
        },
    );

    let mut kakao = record(Platform::KakaoMap, "k-1", "Blue Bottle", "서울 성수동 1-1");
    kakao.latitude = Some(37.5000);
    kakao.longitude = Some(127.0000);
    lenient.reconcile(&kakao).await.unwrap();

    // Too dissimilar for the default 0.8 threshold, similar enough at 0.6.
    let mut naver = record(Platform::NaverMap, "n-9", "Blue Bottle Coffee", "성수동 1-1");
    naver.latitude = Some(37.5001);
    naver.longitude = Some(127.0001);

    let outcome = lenient.reconcile(&naver).await.unwrap();
    assert_eq!(outcome.action, ReconcileAction::AttachedSnapshot);
    assert_eq!(outcome.rule, Some(MatchRule::GeoName));
    assert_eq!(mem.venue_count(), 1);
}

#[tokio::test]
async fn marker_prefixed_address_still_matches_across_platforms() {
    let (mem, store) = setup();
    let reconciler = reconciler(store.clone());

    // Kakao lot-number addresses carry the 지번 marker; the Naver listing
    // for the same lot does not. No coordinates or phone, so only the
    // name+address rule can connect them.
    let kakao = record(Platform::KakaoMap, "k-1", "Lowide", "지번 성수동1가 668-134");
    let created = reconciler.reconcile(&kakao).await.unwrap();
    assert_eq!(created.action, ReconcileAction::Created);

    let naver = record(Platform::NaverMap, "n-4", "Lowide", "성수동1가 668-134");
    let attached = reconciler.reconcile(&naver).await.unwrap();
    assert_eq!(attached.action, ReconcileAction::AttachedSnapshot);
    assert_eq!(attached.rule, Some(MatchRule::NameAddress));
    assert_eq!(attached.venue.id, created.venue.id);
    assert_eq!(mem.venue_count(), 1);
}

#[tokio::test]
async fn record_matching_two_venues_is_refused() {
    let (mem, store) = setup();

    for (platform, platform_id, name) in [
        (Platform::KakaoMap, "k-1", "Fritz Mapo"),
        (Platform::NaverMap, "n-2", "Fritz Dosan"),
    ] {
        store
            .insert_venue(NewVenue {
                name: name.into(),
                address: format!("addr {platform_id}"),
                phone: "010-1234-5678".into(),
                description: None,
                latitude: None,
                longitude: None,
                source_platform: platform,
                platform_id: platform_id.into(),
                status: VenueStatus::Active,
                normalized_phone: "010-1234-5678".into(),
                normalized_address: format!("addr {platform_id}"),
            })
            .await
            .unwrap();
    }

    let mut r = record(Platform::NaverBlog, "blog-7", "Fritz", "somewhere else");
    r.phone = Some("01012345678".into());

    let err = reconciler(store.clone()).reconcile(&r).await.unwrap_err();
    match err {
        CatalogError::AmbiguousMatch { venue_ids } => assert_eq!(venue_ids.len(), 2),
        other => panic!("expected ambiguous match, got {other}"),
    }
    assert_eq!(mem.venue_count(), 2);
}

#[tokio::test]
async fn status_hints_only_move_forward() {
    let (mem, store) = setup();
    let reconciler = reconciler(store.clone());

    let r = record(Platform::KakaoMap, "k-1", "Onion", "서울 성수동 2-8");
    let created = reconciler.reconcile(&r).await.unwrap();
    mem.force_status(created.venue.id, VenueStatus::Active);

    // A stale New hint cannot demote an active venue.
    let mut stale = r.clone();
    stale.status_hint = Some(VenueStatus::New);
    let outcome = reconciler.reconcile(&stale).await.unwrap();
    assert_eq!(outcome.venue.status, VenueStatus::Active);

    // A closure hint moves it forward.
    let mut closing = r.clone();
    closing.status_hint = Some(VenueStatus::ClosedSuspected);
    let outcome = reconciler.reconcile(&closing).await.unwrap();
    assert_eq!(outcome.venue.status, VenueStatus::ClosedSuspected);
}

#[tokio::test]
async fn closure_takes_two_misses_and_recovery_takes_one_hit() {
    let (mem, store) = setup();
    let r = record(Platform::KakaoMap, "k-1", "Anthracite", "서울 합정동 357-6");
    let created = reconciler(store.clone()).reconcile(&r).await.unwrap();
    mem.force_status(created.venue.id, VenueStatus::Active);

    let crawler: Arc<dyn Crawler> = Arc::new(MockCrawler::new());
    let validator = LifecycleValidator::new(store.clone(), crawler, Pacing::none());

    let v = validator.validate(created.venue.id, false).await.unwrap();
    assert_eq!(v.status, VenueStatus::ClosedSuspected);

    // A hit while suspected recovers.
    let v = validator.validate(created.venue.id, true).await.unwrap();
    assert_eq!(v.status, VenueStatus::Active);

    // Two consecutive misses confirm; confirmation is terminal.
    validator.validate(created.venue.id, false).await.unwrap();
    let v = validator.validate(created.venue.id, false).await.unwrap();
    assert_eq!(v.status, VenueStatus::ClosedConfirmed);
    let v = validator.validate(created.venue.id, true).await.unwrap();
    assert_eq!(v.status, VenueStatus::ClosedConfirmed);
}

#[tokio::test]
async fn suspected_batch_survives_a_failing_probe() {
    let (mem, store) = setup();
    let reconciler = reconciler(store.clone());

    let gone = reconciler
        .reconcile(&record(Platform::KakaoMap, "k-1", "Gone Cafe", "addr 1"))
        .await
        .unwrap();
    let flaky = reconciler
        .reconcile(&record(Platform::KakaoMap, "k-2", "Flaky Cafe", "addr 2"))
        .await
        .unwrap();
    mem.force_status(gone.venue.id, VenueStatus::ClosedSuspected);
    mem.force_status(flaky.venue.id, VenueStatus::ClosedSuspected);

    // k-2 has no registered existence probe, so its check errors out.
    let crawler: Arc<dyn Crawler> =
        Arc::new(MockCrawler::new().on_existence(Platform::KakaoMap, "k-1", false));
    let validator = LifecycleValidator::new(store.clone(), crawler, Pacing::none());

    let (_tx, shutdown) = shutdown_channel();
    let stats = validator.revalidate_suspected(&shutdown).await.unwrap();
    assert_eq!(stats.checked, 1);
    assert_eq!(stats.confirmed, 1);
    assert_eq!(stats.failed, 1);

    let v = store.venue(gone.venue.id).await.unwrap().unwrap();
    assert_eq!(v.status, VenueStatus::ClosedConfirmed);
    let v = store.venue(flaky.venue.id).await.unwrap().unwrap();
    assert_eq!(v.status, VenueStatus::ClosedSuspected);
}

#[tokio::test]
async fn active_sample_spot_checks_bounded_and_flags_misses() {
    let (mem, store) = setup();
    let reconciler = reconciler(store.clone());

    let open = reconciler
        .reconcile(&record(Platform::KakaoMap, "k-1", "Open Cafe", "addr 1"))
        .await
        .unwrap();
    let gone = reconciler
        .reconcile(&record(Platform::KakaoMap, "k-2", "Gone Cafe", "addr 2"))
        .await
        .unwrap();
    mem.force_status(open.venue.id, VenueStatus::Active);
    mem.force_status(gone.venue.id, VenueStatus::Active);

    let crawler: Arc<dyn Crawler> = Arc::new(
        MockCrawler::new()
            .on_existence(Platform::KakaoMap, "k-1", true)
            .on_existence(Platform::KakaoMap, "k-2", false),
    );
    let validator = LifecycleValidator::new(store.clone(), crawler, Pacing::none());

    // Sample larger than the active set covers everything.
    let (_tx, shutdown) = shutdown_channel();
    let stats = validator.revalidate_active_sample(10, &shutdown).await.unwrap();
    assert_eq!(stats.checked, 2);
    assert_eq!(stats.suspected, 1);

    let v = store.venue(gone.venue.id).await.unwrap().unwrap();
    assert_eq!(v.status, VenueStatus::ClosedSuspected);
    let v = store.venue(open.venue.id).await.unwrap().unwrap();
    assert_eq!(v.status, VenueStatus::Active);

    // The bound holds when the set is larger than the sample.
    let stats = validator.revalidate_active_sample(1, &shutdown).await.unwrap();
    assert_eq!(stats.checked, 1);
}

#[tokio::test]
async fn overlapping_review_listings_insert_each_review_once() {
    let (mem, store) = setup();
    let created = reconciler(store.clone())
        .reconcile(&record(Platform::KakaoMap, "k-1", "Fritz", "addr"))
        .await
        .unwrap();
    let syncer = ReviewSyncer::new(store.clone());

    let first: Vec<_> = (1..=3).map(|d| crawled_review(&format!("r-{d}"), d)).collect();
    assert_eq!(syncer.sync_reviews(created.venue.id, &first).await.unwrap(), 3);

    // Second crawl overlaps days 2-3 and adds days 4-5.
    let second: Vec<_> = (2..=5).map(|d| crawled_review(&format!("r-{d}"), d)).collect();
    assert_eq!(syncer.sync_reviews(created.venue.id, &second).await.unwrap(), 2);

    assert_eq!(mem.review_count(), 5);

    // Crawled reviews never move the first-party aggregates.
    let v = store.venue(created.venue.id).await.unwrap().unwrap();
    assert_eq!(v.review_count, 0);
    assert_eq!(v.rating_avg, 0.0);
}

#[tokio::test]
async fn first_party_reviews_drive_the_running_aggregates() {
    let (_mem, store) = setup();
    let created = reconciler(store.clone())
        .reconcile(&record(Platform::KakaoMap, "k-1", "Fritz", "addr"))
        .await
        .unwrap();
    let syncer = ReviewSyncer::new(store.clone());

    let kept = syncer
        .add_user_review(created.venue.id, "mina", 5, "great beans", None)
        .await
        .unwrap();
    syncer
        .add_user_review(created.venue.id, "joon", 3, "crowded", None)
        .await
        .unwrap();

    let v = store.venue(created.venue.id).await.unwrap().unwrap();
    assert_eq!(v.review_count, 2);
    assert!((v.rating_avg - 4.0).abs() < 1e-9);

    syncer.delete_review(kept.id).await.unwrap();
    let v = store.venue(created.venue.id).await.unwrap().unwrap();
    assert_eq!(v.review_count, 1);
    assert!((v.rating_avg - 3.0).abs() < 1e-9);

    let err = syncer
        .add_user_review(created.venue.id, "anon", 0, "bad rating", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvariantViolation(_)));
}

#[tokio::test]
async fn bookmark_count_never_goes_negative() {
    let (_mem, store) = setup();
    let created = reconciler(store.clone())
        .reconcile(&record(Platform::KakaoMap, "k-1", "Fritz", "addr"))
        .await
        .unwrap();

    assert_eq!(store.adjust_bookmark_count(created.venue.id, 1).await.unwrap(), 1);
    assert_eq!(store.adjust_bookmark_count(created.venue.id, -1).await.unwrap(), 0);
    assert_eq!(store.adjust_bookmark_count(created.venue.id, -1).await.unwrap(), 0);
}

#[tokio::test]
async fn platform_review_sync_walks_every_venue() {
    let (mem, store) = setup();
    let rec = reconciler(store.clone());
    let a = rec
        .reconcile(&record(Platform::KakaoMap, "k-1", "Cafe A", "addr 1"))
        .await
        .unwrap();
    let b = rec
        .reconcile(&record(Platform::KakaoMap, "k-2", "Cafe B", "addr 2"))
        .await
        .unwrap();

    // k-2 has no review listing registered, so it fails and is skipped.
    let crawler: Arc<dyn Crawler> = Arc::new(MockCrawler::new().on_reviews(
        Platform::KakaoMap,
        "k-1",
        vec![crawled_review("r-1", 1), crawled_review("r-2", 2)],
    ));

    let (_tx, shutdown) = shutdown_channel();
    let stats = ReviewSyncer::new(store.clone())
        .sync_platform(&crawler, Pacing::none(), Platform::KakaoMap, &shutdown)
        .await
        .unwrap();

    assert_eq!(stats.venues_ok, 1);
    assert_eq!(stats.venues_failed, 1);
    assert_eq!(stats.inserted, 2);
    assert_eq!(mem.review_count(), 2);
    assert_eq!(store.reviews_for_venue(a.venue.id).await.unwrap().len(), 2);
    assert!(store.reviews_for_venue(b.venue.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn discovery_finishes_remaining_regions_after_a_failure() {
    let (mem, store) = setup();

    let crawler = MockCrawler::new()
        .on_search(
            Platform::KakaoMap,
            "mapo",
            "카페",
            vec![record(Platform::KakaoMap, "k-1", "Cafe Mapo", "mapo 1")],
        )
        .fail_search(Platform::KakaoMap, "seongsu", "카페")
        .on_search(
            Platform::KakaoMap,
            "itaewon",
            "카페",
            vec![record(Platform::KakaoMap, "k-3", "Cafe Itaewon", "itaewon 3")],
        );
    let crawler: Arc<dyn Crawler> = Arc::new(crawler);

    let runner = DiscoveryRunner::new(reconciler(store.clone()), crawler, Pacing::none());
    let regions: Vec<String> = ["mapo", "seongsu", "itaewon"]
        .iter()
        .map(|r| r.to_string())
        .collect();

    let (_tx, shutdown) = shutdown_channel();
    let stats = runner
        .run(Platform::KakaoMap, &regions, "카페", &shutdown)
        .await
        .unwrap();

    assert_eq!(stats.units_ok, 2);
    assert_eq!(stats.units_failed, 1);
    assert_eq!(stats.new_venues, 2);
    assert_eq!(mem.venue_count(), 2);
}

#[tokio::test]
async fn discovery_stops_at_a_shutdown_signal() {
    let (mem, store) = setup();
    let crawler: Arc<dyn Crawler> = Arc::new(MockCrawler::new().on_search(
        Platform::KakaoMap,
        "mapo",
        "카페",
        vec![record(Platform::KakaoMap, "k-1", "Cafe Mapo", "mapo 1")],
    ));
    let runner = DiscoveryRunner::new(reconciler(store.clone()), crawler, Pacing::none());

    let (tx, shutdown) = shutdown_channel();
    tx.send(true).unwrap();

    let stats = runner
        .run(Platform::KakaoMap, &["mapo".to_string()], "카페", &shutdown)
        .await
        .unwrap();
    assert_eq!(stats.units_ok, 0);
    assert_eq!(stats.units_failed, 0);
    assert_eq!(mem.venue_count(), 0);
}

#[tokio::test]
async fn discovery_counts_ambiguous_records_without_merging() {
    let (mem, store) = setup();

    for (platform, platform_id) in [(Platform::KakaoMap, "k-1"), (Platform::NaverMap, "n-2")] {
        store
            .insert_venue(NewVenue {
                name: format!("Twin {platform_id}"),
                address: format!("addr {platform_id}"),
                phone: "010-9999-0000".into(),
                description: None,
                latitude: None,
                longitude: None,
                source_platform: platform,
                platform_id: platform_id.into(),
                status: VenueStatus::Active,
                normalized_phone: "010-9999-0000".into(),
                normalized_address: format!("addr {platform_id}"),
            })
            .await
            .unwrap();
    }

    let mut ambiguous = record(Platform::NaverBlog, "blog-1", "Twin", "elsewhere");
    ambiguous.phone = Some("010-9999-0000".into());
    let crawler: Arc<dyn Crawler> =
        Arc::new(MockCrawler::new().on_search(Platform::NaverBlog, "mapo", "카페", vec![ambiguous]));

    let runner = DiscoveryRunner::new(reconciler(store.clone()), crawler, Pacing::none());
    let (_tx, shutdown) = shutdown_channel();
    let stats = runner
        .run(Platform::NaverBlog, &["mapo".to_string()], "카페", &shutdown)
        .await
        .unwrap();

    assert_eq!(stats.units_ok, 1);
    assert_eq!(stats.ambiguous, 1);
    assert_eq!(stats.new_venues, 0);
    assert_eq!(mem.venue_count(), 2);
}

#[tokio::test]
async fn discovery_counts_records_that_fail_reconciliation() {
    let (mem, store) = setup();
    let rec = reconciler(store.clone());

    // Stage a broken catalog: two venues forced onto one platform
    // identity. Reconciling that identity must fail, be counted, and
    // leave the catalog untouched.
    let a = rec
        .reconcile(&record(Platform::KakaoMap, "k-1", "Twin A", "addr 1"))
        .await
        .unwrap();
    rec.reconcile(&record(Platform::KakaoMap, "k-2", "Twin B", "addr 2"))
        .await
        .unwrap();
    mem.force_platform_identity(a.venue.id, Platform::KakaoMap, "k-2");

    let crawler: Arc<dyn Crawler> = Arc::new(MockCrawler::new().on_search(
        Platform::KakaoMap,
        "mapo",
        "카페",
        vec![
            record(Platform::KakaoMap, "k-2", "Twin B", "addr 2"),
            record(Platform::KakaoMap, "k-3", "Fresh Cafe", "addr 3"),
        ],
    ));

    let runner = DiscoveryRunner::new(reconciler(store.clone()), crawler, Pacing::none());
    let (_tx, shutdown) = shutdown_channel();
    let stats = runner
        .run(Platform::KakaoMap, &["mapo".to_string()], "카페", &shutdown)
        .await
        .unwrap();

    assert_eq!(stats.units_ok, 1);
    assert_eq!(stats.records_failed, 1);
    assert_eq!(stats.new_venues, 1);
    assert_eq!(mem.venue_count(), 3);
}

#[tokio::test]
async fn activation_is_an_explicit_step() {
    let (_mem, store) = setup();
    let created = reconciler(store.clone())
        .reconcile(&record(Platform::KakaoMap, "k-1", "Cafe", "addr"))
        .await
        .unwrap();
    assert_eq!(created.venue.status, VenueStatus::New);

    let crawler: Arc<dyn Crawler> = Arc::new(MockCrawler::new());
    let validator = LifecycleValidator::new(store.clone(), crawler, Pacing::none());

    // An existence hit alone never promotes a new venue.
    let v = validator.validate(created.venue.id, true).await.unwrap();
    assert_eq!(v.status, VenueStatus::New);

    let v = validator.activate(created.venue.id).await.unwrap();
    assert_eq!(v.status, VenueStatus::Active);

    validator.validate(created.venue.id, false).await.unwrap();
    validator.validate(created.venue.id, false).await.unwrap();
    let err = validator.activate(created.venue.id).await.unwrap_err();
    assert!(matches!(err, CatalogError::InvariantViolation(_)));
}
