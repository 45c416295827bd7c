use hush::telemetry::MemorySink;
use hush::{CooldownConfig, CooldownEvent, CooldownFilter, CooldownScheduler, Verdict};
use std::sync::Arc;
use std::time::Duration;

fn activated(threshold: u32, cooldown_secs: u64, rate: u32) -> (CooldownFilter, MemorySink) {
    let scheduler = Arc::new(CooldownScheduler::spawn().expect("inside tokio runtime"));
    let sink = MemorySink::new();
    let config = CooldownConfig::new(threshold, cooldown_secs, rate).expect("valid config");
    let filter = CooldownFilter::new(config, scheduler).with_sink(sink.clone());
    filter.activate().expect("activation succeeds");
    (filter, sink)
}

#[tokio::test(start_paused = true)]
async fn flood_is_cut_off_and_released_after_cooldown() {
    let (filter, sink) = activated(20, 30, 1);

    let verdicts: Vec<Verdict> = (0..20).map(|_| filter.decide(Some("X"))).collect();
    assert!(verdicts[..19].iter().all(|v| *v == Verdict::Neutral));
    assert_eq!(verdicts[19], Verdict::Deny);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(matches!(
        sink.events().first(),
        Some(CooldownEvent::CooldownStarted { count: 20, .. })
    ));

    let obs = filter.observe("X").expect("active");
    assert_eq!(obs.verdict, Verdict::Neutral);
    assert_eq!(obs.count, 1);
}

#[tokio::test(start_paused = true)]
async fn occasional_message_decays_away() {
    let (filter, _sink) = activated(5, 30, 1);
    for _ in 0..3 {
        assert_eq!(filter.decide(Some("Y")), Verdict::Neutral);
    }

    tokio::time::sleep(Duration::from_millis(4_500)).await;
    assert_eq!(filter.registry().count("Y"), None);

    let obs = filter.observe("Y").expect("active");
    assert_eq!((obs.count, obs.verdict), (1, Verdict::Neutral));
}

#[tokio::test(start_paused = true)]
async fn without_decay_only_eviction_lifts_cooldown() {
    let (filter, sink) = activated(3, 30, 0);
    for _ in 0..5 {
        filter.decide(Some("Z"));
    }

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(filter.decide(Some("Z")), Verdict::Deny);
    assert_eq!(filter.registry().count("Z"), Some(6));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(filter.decide(Some("Z")), Verdict::Neutral);
    assert_eq!(
        sink.events().last(),
        Some(&CooldownEvent::CooldownLifted { message: "Z".into() })
    );
}

#[tokio::test(start_paused = true)]
async fn deactivation_stops_all_callbacks() {
    let (filter, sink) = activated(2, 30, 1);
    filter.decide(Some("a"));
    filter.decide(Some("a"));
    filter.decide(Some("b"));

    filter.deactivate();
    assert!(filter.registry().is_empty());
    sink.clear();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(sink.is_empty(), "no decay or eviction after deactivate: {:?}", sink.events());
    assert_eq!(filter.decide(Some("a")), Verdict::Neutral);
}

#[tokio::test(start_paused = true)]
async fn filters_share_one_scheduler_independently() {
    let scheduler = Arc::new(CooldownScheduler::spawn().expect("inside tokio runtime"));
    let strict = CooldownFilter::new(CooldownConfig::new(2, 10, 0).unwrap(), scheduler.clone());
    let lenient = CooldownFilter::new(CooldownConfig::new(2, 60, 0).unwrap(), scheduler);
    strict.activate().unwrap();
    lenient.activate().unwrap();

    for _ in 0..2 {
        strict.decide(Some("m"));
        lenient.decide(Some("m"));
    }

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(strict.decide(Some("m")), Verdict::Neutral);
    assert_eq!(lenient.decide(Some("m")), Verdict::Deny);
}

#[test]
fn concurrent_callers_on_dedicated_scheduler_start_one_cooldown() {
    const THREADS: usize = 64;
    let scheduler = Arc::new(CooldownScheduler::dedicated().expect("scheduler thread"));
    let sink = MemorySink::new();
    let filter = Arc::new(
        CooldownFilter::new(CooldownConfig::new(50, 30, 0).unwrap(), scheduler)
            .with_sink(sink.clone()),
    );
    filter.activate().unwrap();
    let barrier = Arc::new(std::sync::Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let filter = Arc::clone(&filter);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                filter.decide(Some(&format!("unique {i}")));
                filter.decide(Some("hot"))
            })
        })
        .collect();

    let denied = handles.into_iter().map(|h| h.join().unwrap()).filter(|v| v.is_deny()).count();
    assert_eq!(denied, THREADS - 49);

    // The notice is delivered by the scheduler thread.
    let started = || {
        sink.events()
            .into_iter()
            .filter(|e| matches!(e, CooldownEvent::CooldownStarted { .. }))
            .count()
    };
    for _ in 0..500 {
        if started() > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(started(), 1);
    assert_eq!(filter.registry().len(), THREADS + 1);
}
