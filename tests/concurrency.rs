//! Concurrent request handling
//!
//! Identical inputs in flight at the same time must share one segmentation;
//! distinct inputs must not block each other or share results.

use bgremove_pipeline::{
    backends::test_utils::{FailingSegmenter, MockSegmenter},
    BackgroundRemovalPipeline, FillColor, PipelineConfig,
};
use futures::future::join_all;
use image::{ImageFormat, RgbaImage};
use std::sync::Arc;
use std::time::Duration;

fn png_bytes(seed: u8) -> Vec<u8> {
    let image = RgbaImage::from_fn(12, 12, |x, y| {
        image::Rgba([seed, (x * 20) as u8, (y * 20) as u8, 255])
    });
    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("test image should encode");
    buffer.into_inner()
}

#[tokio::test]
async fn test_identical_concurrent_requests_segment_once() {
    let mock = MockSegmenter::with_delay(Duration::from_millis(50));
    let pipeline = BackgroundRemovalPipeline::with_default_config(Arc::new(mock.clone()));
    let bytes = png_bytes(1);

    let results = join_all((0..8).map(|_| pipeline.process_bytes(&bytes, None))).await;

    assert_eq!(mock.call_count(), 1);
    let outputs: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    let misses = outputs.iter().filter(|r| !r.metadata.cache_hit).count();
    assert_eq!(misses, 1);
    assert!(outputs.windows(2).all(|w| w[0].bytes() == w[1].bytes()));

    let stats = pipeline.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 7);
    assert_eq!(stats.entries, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identical_requests_across_tasks_segment_once() {
    let mock = MockSegmenter::with_delay(Duration::from_millis(50));
    let pipeline = Arc::new(BackgroundRemovalPipeline::with_default_config(Arc::new(
        mock.clone(),
    )));
    let bytes = Arc::new(png_bytes(2));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            let bytes = Arc::clone(&bytes);
            // Mix fills: the cached segmentation is independent of the fill
            let fill = (i % 2 == 0).then_some(FillColor::WHITE);
            tokio::spawn(async move { pipeline.process_bytes(&bytes, fill).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_distinct_inputs_segment_separately() {
    let mock = MockSegmenter::with_delay(Duration::from_millis(20));
    let pipeline = BackgroundRemovalPipeline::with_default_config(Arc::new(mock.clone()));
    let inputs: Vec<Vec<u8>> = (0..4).map(png_bytes).collect();

    let results = join_all(inputs.iter().map(|bytes| pipeline.process_bytes(bytes, None))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(mock.call_count(), 4);
    assert_eq!(pipeline.cache_stats().entries, 4);
}

#[tokio::test]
async fn test_concurrent_failures_are_shared() {
    let failing = FailingSegmenter::with_delay("backend down", Duration::from_millis(50));
    let pipeline = BackgroundRemovalPipeline::with_default_config(Arc::new(failing.clone()));
    let bytes = png_bytes(3);

    let results = join_all((0..4).map(|_| pipeline.process_bytes(&bytes, None))).await;
    assert!(results
        .iter()
        .all(|r| r.as_ref().is_err_and(|e| e.is_capability_error())));
    // Waiters receive the in-flight failure instead of calling the backend again
    assert_eq!(failing.call_count(), 1);
    assert_eq!(pipeline.cache_stats().entries, 0);

    // A fresh request after the failure settles tries again
    assert!(pipeline.process_bytes(&bytes, None).await.is_err());
    assert_eq!(failing.call_count(), 2);
}

#[tokio::test]
async fn test_failed_keys_do_not_occupy_the_cache() {
    let failing = FailingSegmenter::new("backend down");
    let pipeline = BackgroundRemovalPipeline::with_default_config(Arc::new(failing.clone()));

    for seed in 0..5 {
        assert!(pipeline.process_bytes(&png_bytes(seed), None).await.is_err());
    }
    assert_eq!(failing.call_count(), 5);
    assert_eq!(pipeline.cache_stats().entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_cache_keeps_in_flight_keys() {
    let mock = MockSegmenter::with_delay(Duration::from_millis(100));
    let config = PipelineConfig::builder()
        .cache_capacity(Some(1))
        .build()
        .unwrap();
    let pipeline = BackgroundRemovalPipeline::new(config, Arc::new(mock.clone())).unwrap();
    let slow = png_bytes(10);
    let other = png_bytes(11);

    let first = pipeline.process_bytes(&slow, None);
    let second = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        pipeline.process_bytes(&other, None).await
    };
    let repeat = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        pipeline.process_bytes(&slow, None).await
    };
    let (first, second, repeat) = tokio::join!(first, second, repeat);

    // The second key must not push out the first while it is still running
    assert_eq!(mock.call_count(), 2);
    assert!(!first.unwrap().metadata.cache_hit);
    assert!(second.is_ok());
    assert!(repeat.unwrap().metadata.cache_hit);
}

#[tokio::test]
async fn test_bounded_cache_under_load() {
    let mock = MockSegmenter::new();
    let config = PipelineConfig::builder()
        .cache_capacity(Some(2))
        .build()
        .unwrap();
    let pipeline = BackgroundRemovalPipeline::new(config, Arc::new(mock.clone())).unwrap();
    let inputs: Vec<Vec<u8>> = (0..5).map(png_bytes).collect();

    for bytes in &inputs {
        pipeline.process_bytes(bytes, None).await.unwrap();
    }
    assert_eq!(pipeline.cache_stats().entries, 2);

    // Oldest entry was evicted and is recomputed
    pipeline.process_bytes(&inputs[0], None).await.unwrap();
    assert_eq!(mock.call_count(), 6);
    // Newest entry is still cached
    let recent = pipeline.process_bytes(&inputs[4], None).await.unwrap();
    assert!(recent.metadata.cache_hit);
}
