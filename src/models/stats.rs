use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::generation::{round_tenths, GenerationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_generations: u32,
    pub average_time: f64,
    pub total_videos: u32,
    pub success_rate: u32,
    /// Timestamp of the newest history entry, not the moment the stats were
    /// recomputed. Deleting or clearing history therefore moves it back.
    pub last_generation: Option<DateTime<Utc>>,
    pub today_generations: u32,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            total_generations: 0,
            average_time: 0.0,
            total_videos: 0,
            success_rate: 100,
            last_generation: None,
            today_generations: 0,
        }
    }
}

impl Statistics {
    /// Projects the aggregate view of a newest-first history as seen at `now`.
    pub fn from_history(history: &[GenerationResult], now: DateTime<Local>) -> Self {
        let successes: Vec<&GenerationResult> = history.iter().filter(|h| h.is_success()).collect();
        let failed = history.len() - successes.len();
        let attempts = successes.len() + failed;

        let timed: Vec<f64> = successes
            .iter()
            .map(|h| h.processing_time)
            .filter(|t| *t > 0.0)
            .collect();
        let average_time = if timed.is_empty() {
            0.0
        } else {
            round_tenths(timed.iter().sum::<f64>() / timed.len() as f64)
        };

        let success_rate = if attempts > 0 {
            (successes.len() as f64 / attempts as f64 * 100.0).round() as u32
        } else {
            100
        };

        let today = now.date_naive();
        let today_generations = successes
            .iter()
            .filter(|h| h.timestamp.with_timezone(&Local).date_naive() == today)
            .count();

        Self {
            total_generations: successes.len() as u32,
            average_time,
            total_videos: successes.iter().filter(|h| h.has_video()).count() as u32,
            success_rate,
            last_generation: history.first().map(|h| h.timestamp),
            today_generations: today_generations as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeneratedAssets, GenerationRequest};
    use chrono::Duration;

    fn request() -> GenerationRequest {
        GenerationRequest {
            image_url: "https://x.com/a.png".to_string(),
            api_key: "0123456789".to_string(),
            ..Default::default()
        }
    }

    fn success(secs: f64, video: bool) -> GenerationResult {
        let assets = GeneratedAssets {
            images: vec!["https://x.com/1.png".to_string()],
            video: video.then(|| "https://x.com/v.mp4".to_string()),
        };
        GenerationResult::success(&request(), assets, secs)
    }

    fn failure() -> GenerationResult {
        GenerationResult::failed(&request(), "nope", 3.0)
    }

    #[test]
    fn empty_history_yields_defaults() {
        let stats = Statistics::from_history(&[], Local::now());
        assert_eq!(stats, Statistics::default());
        assert_eq!(stats.success_rate, 100);
    }

    #[test]
    fn counts_only_successes() {
        let history = vec![success(10.0, true), failure(), success(20.0, false), failure(), failure()];
        let stats = Statistics::from_history(&history, Local::now());

        assert_eq!(stats.total_generations, 2);
        assert_eq!(stats.total_videos, 1);
        assert_eq!(stats.average_time, 15.0);
        // 2 of 5 attempts
        assert_eq!(stats.success_rate, 40);
        assert_eq!(stats.today_generations, 2);
        assert_eq!(stats.last_generation, Some(history[0].timestamp));
    }

    #[test]
    fn success_rate_rounds() {
        let history = vec![success(1.0, false), success(1.0, false), failure()];
        let stats = Statistics::from_history(&history, Local::now());
        assert_eq!(stats.success_rate, 67);
    }

    #[test]
    fn zero_processing_time_is_left_out_of_average() {
        let history = vec![success(0.0, false), success(4.0, false), success(7.0, false)];
        let stats = Statistics::from_history(&history, Local::now());
        assert_eq!(stats.total_generations, 3);
        assert_eq!(stats.average_time, 5.5);
    }

    #[test]
    fn only_todays_successes_count_for_today() {
        let mut old = success(5.0, false);
        old.timestamp = Utc::now() - Duration::days(3);
        let mut todays_failure = failure();
        todays_failure.timestamp = Utc::now();
        let history = vec![success(5.0, false), todays_failure, old];

        let stats = Statistics::from_history(&history, Local::now());
        assert_eq!(stats.today_generations, 1);
        assert_eq!(stats.total_generations, 2);
    }
}
