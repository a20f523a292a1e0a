//! Dispatcher queue classification: a total, pure function of three job
//! attributes that selects one of the three broker queues.

use crate::model::Queue;

/// Classifies a job into a queue. First matching row wins.
///
/// | Predicate | Queue |
/// |---|---|
/// | `is_4k && video_count > 20`, or `!is_4k && video_count > 40` | `4k_queue` |
/// | `has_text_animation`, or (`is_4k && video_count <= 20`) | `gpu_queue` |
/// | otherwise | `default_queue` |
pub fn classify_queue(is_4k: bool, video_count: u32, has_text_animation: bool) -> Queue {
    let is_large = (is_4k && video_count > 20) || (!is_4k && video_count > 40);
    if is_large {
        return Queue::FourKQueue;
    }
    let is_gpu = has_text_animation || (is_4k && video_count <= 20);
    if is_gpu {
        return Queue::GpuQueue;
    }
    Queue::DefaultQueue
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundary_non_4k_forty_videos_is_default() {
        assert_eq!(classify_queue(false, 40, false), Queue::DefaultQueue);
    }

    #[test]
    fn boundary_non_4k_forty_one_videos_is_4k_queue() {
        assert_eq!(classify_queue(false, 41, false), Queue::FourKQueue);
    }

    #[test]
    fn boundary_4k_twenty_videos_is_gpu_queue() {
        assert_eq!(classify_queue(true, 20, false), Queue::GpuQueue);
    }

    #[test]
    fn boundary_4k_twenty_one_videos_is_4k_queue() {
        assert_eq!(classify_queue(true, 21, false), Queue::FourKQueue);
    }

    #[test]
    fn text_animation_small_non_4k_job_is_gpu_queue() {
        assert_eq!(classify_queue(false, 10, true), Queue::GpuQueue);
    }

    #[test]
    fn zero_videos_no_flags_is_default() {
        assert_eq!(classify_queue(false, 0, false), Queue::DefaultQueue);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        #[test]
        fn prop_classify_is_total(is_4k: bool, video_count in 0u32..500, has_text in proptest::bool::ANY) {
            // Must not panic and must return exactly one of the three queues.
            let q = classify_queue(is_4k, video_count, has_text);
            prop_assert!(matches!(q, Queue::DefaultQueue | Queue::GpuQueue | Queue::FourKQueue));
        }

        #[test]
        fn prop_large_job_always_wins_4k_queue(video_count in 41u32..1000) {
            prop_assert_eq!(classify_queue(false, video_count, false), Queue::FourKQueue);
            prop_assert_eq!(classify_queue(false, video_count, true), Queue::FourKQueue);
        }

        #[test]
        fn prop_4k_above_twenty_always_4k_queue(video_count in 21u32..1000, has_text in proptest::bool::ANY) {
            prop_assert_eq!(classify_queue(true, video_count, has_text), Queue::FourKQueue);
        }
    }
}
