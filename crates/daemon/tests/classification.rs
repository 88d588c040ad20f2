mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{harness, item, StubClassifier, StubFetcher};
use recent_actions_daemon::classification::{AlreadyRunning, DerivedView};

#[tokio::test]
async fn classify_item_is_deterministic() {
    let h = harness(StubFetcher::new(), StubClassifier::trees());
    let pipeline = h.svc.classification();
    for _ in 0..3 {
        assert!(pipeline.classify_item("Persistent segment tree").await);
        assert!(!pipeline.classify_item("Round 999 announcement").await);
    }
}

#[tokio::test(start_paused = true)]
async fn classify_item_gives_up_after_three_attempts() {
    let h = harness(StubFetcher::new(), StubClassifier::unreachable());
    let started = tokio::time::Instant::now();

    assert!(!h.svc.classification().classify_item("Link-cut tree").await);

    assert_eq!(h.classifier.calls_for("Link-cut tree"), 3);
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn classify_item_recovers_from_transient_failures() {
    let failures = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&failures);
    let classifier = StubClassifier::new(move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) < 2 {
            None
        } else {
            Some(true)
        }
    });
    let h = harness(StubFetcher::new(), classifier);

    assert!(h.svc.classification().classify_item("Suffix automaton").await);
    assert_eq!(h.classifier.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failing_item_is_excluded_and_order_is_kept() {
    let classifier = StubClassifier::new(|t| {
        if t == "Flaky tree post" {
            None
        } else {
            Some(t.contains("tree"))
        }
    });
    let h = harness(StubFetcher::new(), classifier);
    h.fetcher.push_ok(vec![
        item("a", "Segment tree tricks"),
        item("b", "Flaky tree post"),
        item("c", "Contest announcement"),
        item("d", "Fenwick tree"),
    ]);
    h.svc.refresher().refresh().await;
    let primary = h.svc.cache().primary().unwrap();

    let derived = h.svc.classification().run_classification(primary).await.unwrap();

    assert_eq!(derived.items, vec![item("a", "Segment tree tricks"), item("d", "Fenwick tree")]);
    assert_eq!(h.classifier.calls_for("Flaky tree post"), 3);
    assert_eq!(
        h.classifier.calls(),
        vec![
            "Segment tree tricks",
            "Flaky tree post",
            "Flaky tree post",
            "Flaky tree post",
            "Contest announcement",
            "Fenwick tree",
        ]
    );
    assert!(!h.svc.classification().is_running());
    assert_eq!(h.svc.cache().derived().unwrap().items, derived.items);
}

#[tokio::test(start_paused = true)]
async fn unreachable_classifier_still_completes_the_run() {
    let h = harness(StubFetcher::new(), StubClassifier::unreachable());
    h.fetcher.push_ok(vec![item("a", "Treap tree"), item("b", "Dinic")]);
    h.svc.refresher().refresh().await;

    assert_eq!(h.svc.classification().spawn_run(h.svc.cache().primary().unwrap()), DerivedView::Started);
    h.svc.classification().join().await;

    assert!(!h.svc.classification().is_running());
    let derived = h.svc.cache().derived().unwrap();
    assert!(derived.is_empty());
    assert_eq!(h.classifier.calls().len(), 6);
}

#[tokio::test]
async fn only_one_run_at_a_time() {
    let (classifier, open) = StubClassifier::trees().gated();
    let h = harness(StubFetcher::new(), classifier);
    h.fetcher.push_ok(vec![item("a", "Segment tree"), item("b", "News")]);
    h.svc.refresher().refresh().await;
    let primary = h.svc.cache().primary().unwrap();
    let pipeline = h.svc.classification();

    assert_eq!(pipeline.spawn_run(Arc::clone(&primary)), DerivedView::Started);
    assert!(pipeline.is_running());
    assert_eq!(pipeline.spawn_run(Arc::clone(&primary)), DerivedView::InProgress);
    assert_eq!(
        pipeline.run_classification(Arc::clone(&primary)).await,
        Err(AlreadyRunning)
    );

    open.send(true).unwrap();
    pipeline.join().await;

    assert!(!pipeline.is_running());
    assert_eq!(h.classifier.calls(), vec!["Segment tree", "News"]);
    assert_eq!(h.svc.cache().derived().unwrap().items, vec![item("a", "Segment tree")]);

    // The flag is free again, and with the view in place no run starts.
    assert!(matches!(pipeline.spawn_run(primary), DerivedView::Ready(_)));
    assert!(!pipeline.is_running());
    assert_eq!(h.classifier.calls().len(), 2);
}

#[tokio::test]
async fn result_for_replaced_snapshot_is_discarded() {
    let (classifier, open) = StubClassifier::trees().gated();
    let h = harness(StubFetcher::new(), classifier);
    h.fetcher.push_ok(vec![item("a", "Old tree")]);
    h.fetcher.push_ok(vec![item("b", "New tree")]);
    h.svc.refresher().refresh().await;

    assert_eq!(h.svc.classification().spawn_run(h.svc.cache().primary().unwrap()), DerivedView::Started);
    h.svc.refresher().refresh().await;
    open.send(true).unwrap();
    h.svc.classification().join().await;

    assert!(h.svc.cache().derived().is_none());
    assert_eq!(h.svc.cache().primary().unwrap().generation, 2);
}

#[tokio::test]
async fn derived_view_walks_through_its_states() {
    let (classifier, open) = StubClassifier::trees().gated();
    let h = harness(StubFetcher::new(), classifier);
    let pipeline = h.svc.classification();

    assert_eq!(pipeline.derived_view(), DerivedView::NoPrimary);

    h.fetcher.push_ok(vec![item("a", "Tree DP"), item("b", "Blog")]);
    h.svc.refresher().refresh().await;

    assert_eq!(pipeline.derived_view(), DerivedView::Started);
    assert_eq!(pipeline.derived_view(), DerivedView::InProgress);

    open.send(true).unwrap();
    pipeline.join().await;

    match pipeline.derived_view() {
        DerivedView::Ready(snapshot) => assert_eq!(snapshot.items, vec![item("a", "Tree DP")]),
        other => panic!("expected ready view, got {other:?}"),
    }
    assert_eq!(h.classifier.calls().len(), 2);
}

#[tokio::test]
async fn abort_abandons_a_run_and_frees_the_flag() {
    let (classifier, _open) = StubClassifier::trees().gated();
    let h = harness(StubFetcher::new(), classifier);
    h.fetcher.push_ok(vec![item("a", "Tree")]);
    h.svc.refresher().refresh().await;
    let pipeline = h.svc.classification();

    assert_eq!(pipeline.spawn_run(h.svc.cache().primary().unwrap()), DerivedView::Started);
    tokio::task::yield_now().await;
    pipeline.abort();
    // The aborted task drops its future, and the run guard with it, once the runtime gets to it.
    for _ in 0..10 {
        if !pipeline.is_running() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert!(!pipeline.is_running());
    assert!(h.svc.cache().derived().is_none());
}

#[tokio::test]
async fn run_is_not_started_when_view_landed_meanwhile() {
    let h = harness(StubFetcher::new(), StubClassifier::trees());
    h.fetcher.push_ok(vec![item("a", "Cartesian tree")]);
    h.svc.refresher().refresh().await;
    let primary = h.svc.cache().primary().unwrap();
    let pipeline = h.svc.classification();

    // A run finishes after a caller saw no view but before it claims the flag.
    pipeline.run_classification(Arc::clone(&primary)).await.unwrap();
    let calls = h.classifier.calls().len();

    match pipeline.spawn_run(primary) {
        DerivedView::Ready(snapshot) => assert_eq!(snapshot.items, vec![item("a", "Cartesian tree")]),
        other => panic!("expected ready view, got {other:?}"),
    }
    assert!(!pipeline.is_running());
    pipeline.join().await;
    assert_eq!(h.classifier.calls().len(), calls);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_start_exactly_one_run() {
    const CALLERS: usize = 16;

    let (classifier, open) = StubClassifier::trees().gated();
    let h = harness(StubFetcher::new(), classifier);
    h.fetcher.push_ok(vec![item("a", "Heavy-light tree"), item("b", "Meetup")]);
    h.svc.refresher().refresh().await;

    let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));
    let mut callers = Vec::with_capacity(CALLERS);
    for _ in 0..CALLERS {
        let pipeline = Arc::clone(h.svc.classification());
        let barrier = Arc::clone(&barrier);
        callers.push(tokio::spawn(async move {
            barrier.wait().await;
            pipeline.derived_view()
        }));
    }

    let mut started = 0;
    let mut in_progress = 0;
    for caller in callers {
        match caller.await.unwrap() {
            DerivedView::Started => started += 1,
            DerivedView::InProgress => in_progress += 1,
            other => panic!("unexpected view {other:?}"),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(in_progress, CALLERS - 1);
    assert!(h.svc.classification().is_running());

    open.send(true).unwrap();
    h.svc.classification().join().await;

    assert!(!h.svc.classification().is_running());
    assert_eq!(h.classifier.calls(), vec!["Heavy-light tree", "Meetup"]);
}
