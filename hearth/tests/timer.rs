use hearth::time::sleep;
use std::time::{Duration, Instant};

#[hearth::test]
async fn test_sleep_basic() {
    let start = Instant::now();
    sleep(Duration::from_millis(50)).await.unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_millis(50),
        "Sleep should wait at least the specified duration"
    );
}

#[hearth::test]
async fn test_sleep_zero_duration() {
    let start = Instant::now();
    sleep(Duration::from_millis(0)).await.unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_millis(10),
        "Zero duration sleep should be fast"
    );
}

#[hearth::test]
async fn test_sleep_in_function() {
    let start = Instant::now();
    sleep_and_record(start).await;
}

async fn sleep_and_record(start: Instant) {
    let elapsed_before = start.elapsed();
    sleep(Duration::from_millis(30)).await.unwrap();
    let elapsed_after = start.elapsed();

    assert!(elapsed_after - elapsed_before >= Duration::from_millis(30));
}

#[hearth::test]
async fn test_concurrent_sleeps_overlap() {
    let start = Instant::now();

    let a = hearth::spawn(sleep(Duration::from_millis(40)));
    let b = hearth::spawn(sleep(Duration::from_millis(40)));

    assert_eq!(a.await, Ok(Ok(())));
    assert_eq!(b.await, Ok(Ok(())));
    assert!(start.elapsed() < Duration::from_millis(400));
}
