use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{GeneratedAssets, GenerationRequest, GenerationResult};

use super::progress::ramp;
use super::transport::{HttpTransport, Transport, TransportError, TransportResponse};

pub const DEFAULT_API_URL: &str = "https://z0pe9jgn.rcld.app/webhook/generate-content";

const NETWORK_ERROR: &str =
    "Network connection failed. Please check your internet connection and try again.";
const GENERIC_FAILURE: &str = "Generation failed";
const RETRIES_EXHAUSTED: &str = "All retry attempts failed";

/// Fixed timings of one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Pause after the "validating" step.
    pub settle: Duration,
    pub image_ramp: Duration,
    pub video_ramp: Duration,
    /// Wait between failed attempts of [`GenerationClient::retry_generate`].
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            image_ramp: Duration::from_secs(8),
            video_ramp: Duration::from_secs(15),
            retry_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    image_url: &'a str,
    api_key: &'a str,
    generate_video: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    url: Option<String>,
}

enum Failure {
    Timeout(Duration),
    Network,
    Message(String),
}

impl Failure {
    fn into_message(self) -> String {
        match self {
            Failure::Timeout(after) => format!(
                "Request timed out after {} seconds. Please try again.",
                after.as_secs()
            ),
            Failure::Network => NETWORK_ERROR.to_string(),
            Failure::Message(message) => message,
        }
    }
}

impl From<TransportError> for Failure {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Connect(detail) => {
                tracing::debug!("Endpoint unreachable: {}", detail);
                Failure::Network
            }
            TransportError::Other(message) => Failure::Message(message),
        }
    }
}

pub struct GenerationClient {
    transport: Arc<dyn Transport>,
    api_url: String,
    pacing: Pacing,
}

impl GenerationClient {
    pub fn new(api_url: impl Into<String>, pacing: Pacing) -> Self {
        Self::with_transport(Arc::new(HttpTransport::new()), api_url, pacing)
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        api_url: impl Into<String>,
        pacing: Pacing,
    ) -> Self {
        Self {
            transport,
            api_url: api_url.into(),
            pacing,
        }
    }

    /// Runs one generation call. Never fails: every problem ends up in the
    /// returned record's `error`.
    pub async fn generate<P>(&self, request: &GenerationRequest, on_progress: &mut P) -> GenerationResult
    where
        P: FnMut(u8, Option<&str>) + Send,
    {
        let started = Instant::now();

        match self.run(request, on_progress).await {
            Ok(assets) => {
                let result = GenerationResult::success(request, assets, started.elapsed().as_secs_f64());
                tracing::info!(
                    id = %result.id,
                    images = result.assets().map_or(0, |a| a.images.len()),
                    video = result.has_video(),
                    processing_time = result.processing_time,
                    "Generation succeeded"
                );
                result
            }
            Err(failure) => {
                let message = failure.into_message();
                tracing::debug!(image_url = %request.image_url, "Generation failed: {}", message);
                GenerationResult::failed(request, message, started.elapsed().as_secs_f64())
            }
        }
    }

    async fn run<P>(&self, request: &GenerationRequest, on_progress: &mut P) -> std::result::Result<GeneratedAssets, Failure>
    where
        P: FnMut(u8, Option<&str>) + Send,
    {
        on_progress(0, Some("Validating input..."));
        tokio::time::sleep(self.pacing.settle).await;

        on_progress(10, Some("Sending request to API..."));
        let body = GenerateBody {
            image_url: &request.image_url,
            api_key: &request.api_key,
            generate_video: request.generate_video,
            email: Some(request.email.as_str()).filter(|e| !e.is_empty()),
        };
        let body = serde_json::to_value(&body).map_err(|e| Failure::Message(e.to_string()))?;

        let response = tokio::time::timeout(
            self.pacing.request_timeout,
            self.transport.post_json(&self.api_url, &body),
        )
        .await
        .map_err(|_| Failure::Timeout(self.pacing.request_timeout))??;

        on_progress(20, Some("Processing response..."));
        let data = interpret(response)?;

        on_progress(40, Some("Generating images..."));
        ramp(on_progress, 40, 70, self.pacing.image_ramp).await;

        let video = data.get("video").filter(|v| is_truthy(v));
        if request.generate_video && video.is_some() {
            on_progress(70, Some("Generating video..."));
            ramp(on_progress, 70, 95, self.pacing.video_ramp).await;
        } else {
            on_progress(95, Some("Finalizing..."));
        }

        on_progress(100, Some("Complete!"));

        Ok(GeneratedAssets {
            images: extract_images(data.get("image")),
            video: extract_video(video),
        })
    }

    /// Calls [`generate`](Self::generate) up to `max_attempts` times and
    /// returns the first success. Fails with the last error once every
    /// attempt has failed.
    pub async fn retry_generate<P>(
        &self,
        request: &GenerationRequest,
        on_progress: &mut P,
        max_attempts: u32,
    ) -> Result<GenerationResult>
    where
        P: FnMut(u8, Option<&str>) + Send,
    {
        let mut last_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            let label = format!("Attempt {attempt}/{max_attempts}...");
            on_progress(0, Some(label.as_str()));

            let result = self.generate(request, on_progress).await;
            if result.is_success() {
                return Ok(result);
            }
            last_error = result.error().map(str::to_string);

            if attempt < max_attempts {
                tracing::info!(attempt, max_attempts, "Retrying generation");
                let label = format!("Retrying in {} seconds...", self.pacing.retry_delay.as_secs());
                on_progress(0, Some(label.as_str()));
                tokio::time::sleep(self.pacing.retry_delay).await;
            }
        }

        Err(AppError::RetriesExhausted(
            last_error.unwrap_or_else(|| RETRIES_EXHAUSTED.to_string()),
        ))
    }
}

/// Turns the raw response into the parsed body of a successful call.
fn interpret(response: TransportResponse) -> std::result::Result<Value, Failure> {
    if !response.is_success() {
        let message = serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|body| remote_message(&body))
            .unwrap_or_else(|| format!("HTTP {}: {}", response.status, response.reason));
        return Err(Failure::Message(message));
    }

    let data: Value =
        serde_json::from_str(&response.body).map_err(|e| Failure::Message(e.to_string()))?;

    if !data.get("success").is_some_and(is_truthy) {
        return Err(Failure::Message(
            remote_message(&data).unwrap_or_else(|| GENERIC_FAILURE.to_string()),
        ));
    }

    Ok(data)
}

fn remote_message(body: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn media_items<'a>(group: Option<&'a Value>, key: &str) -> impl Iterator<Item = MediaItem> + 'a {
    group
        .and_then(|g| g.get(key))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| MediaItem::deserialize(item).ok())
}

fn extract_images(image: Option<&Value>) -> Vec<String> {
    media_items(image, "gorsel_1")
        .filter(|item| item.kind == "image")
        .filter_map(|item| item.url.filter(|u| !u.is_empty()))
        .collect()
}

fn extract_video(video: Option<&Value>) -> Option<String> {
    media_items(video, "video_1")
        .filter(|item| item.kind == "video")
        .find_map(|item| item.url.filter(|u| !u.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    enum Scripted {
        Respond(u16, &'static str, String),
        Fail(TransportError),
        Hang,
    }

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
        bodies: Mutex<Vec<Value>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(
            &self,
            _url: &str,
            body: &Value,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies.lock().unwrap().push(body.clone());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Respond(status, reason, body)) => Ok(TransportResponse {
                    status,
                    reason: reason.to_string(),
                    body,
                }),
                Some(Scripted::Fail(e)) => Err(e),
                Some(Scripted::Hang) | None => std::future::pending().await,
            }
        }
    }

    fn ok(body: Value) -> Scripted {
        Scripted::Respond(200, "OK", body.to_string())
    }

    fn request(video: bool) -> GenerationRequest {
        GenerationRequest {
            image_url: "https://cdn.shopify.com/product.jpg".to_string(),
            api_key: "longenoughkey123".to_string(),
            email: String::new(),
            generate_video: video,
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> GenerationClient {
        GenerationClient::with_transport(transport, DEFAULT_API_URL, Pacing::default())
    }

    fn full_response() -> Value {
        json!({
            "success": true,
            "image": {
                "gorsel_1": [
                    {"type": "image", "url": "https://cdn.example.com/1.png"},
                    {"type": "thumbnail", "url": "https://cdn.example.com/t.png"},
                    {"type": "image", "url": "https://cdn.example.com/2.png"},
                    {"type": "image"}
                ]
            },
            "video": {
                "video_1": [
                    {"type": "poster", "url": "https://cdn.example.com/p.png"},
                    {"type": "video", "url": "https://cdn.example.com/v.mp4"},
                    {"type": "video", "url": "https://cdn.example.com/v2.mp4"}
                ]
            }
        })
    }

    type Recorded = Vec<(u8, Option<String>)>;

    fn recorder(log: &mut Recorded) -> impl FnMut(u8, Option<&str>) + Send + '_ {
        move |p: u8, step: Option<&str>| log.push((p, step.map(str::to_string)))
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_video_skips_video_ramp() {
        let transport = ScriptedTransport::new(vec![ok(full_response())]);
        let client = client(transport.clone());
        let mut log = Recorded::new();

        let result = client.generate(&request(false), &mut recorder(&mut log)).await;

        assert!(result.is_success());
        let assets = result.assets().unwrap();
        assert_eq!(
            assets.images,
            vec!["https://cdn.example.com/1.png", "https://cdn.example.com/2.png"]
        );
        assert_eq!(assets.video.as_deref(), Some("https://cdn.example.com/v.mp4"));
        assert!((result.processing_time - 8.5).abs() < 0.2);

        let percents: Vec<u8> = log.iter().map(|(p, _)| *p).collect();
        assert_eq!(&percents[..4], &[0, 10, 20, 40]);
        assert_eq!(&percents[percents.len() - 3..], &[70, 95, 100]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert!(log.contains(&(95, Some("Finalizing...".to_string()))));
        assert!(!log.iter().any(|(_, s)| s.as_deref() == Some("Generating video...")));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn requested_video_runs_the_longer_ramp() {
        let transport = ScriptedTransport::new(vec![ok(full_response())]);
        let client = client(transport);
        let mut log = Recorded::new();

        let result = client.generate(&request(true), &mut recorder(&mut log)).await;

        assert!(result.is_success());
        assert!(result.has_video());
        assert!((result.processing_time - 23.5).abs() < 0.2);
        assert!(log.contains(&(70, Some("Generating video...".to_string()))));
        assert!(!log.iter().any(|(_, s)| s.as_deref() == Some("Finalizing...")));
        assert_eq!(log.last().unwrap(), &(100, Some("Complete!".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn requested_video_missing_from_response_jumps_to_finalizing() {
        let transport = ScriptedTransport::new(vec![ok(json!({
            "success": true,
            "image": {"gorsel_1": [{"type": "image", "url": "https://cdn.example.com/1.png"}]}
        }))]);
        let mut log = Recorded::new();

        let result = client(transport).generate(&request(true), &mut recorder(&mut log)).await;

        assert!(result.is_success());
        assert!(!result.has_video());
        assert!(log.contains(&(95, Some("Finalizing...".to_string()))));
    }

    #[tokio::test(start_paused = true)]
    async fn success_with_odd_media_shapes_yields_empty_results() {
        let transport = ScriptedTransport::new(vec![ok(json!({
            "success": true,
            "image": {"gorsel_1": "not-an-array"}
        }))]);

        let result = client(transport).generate(&request(false), &mut |_, _| {}).await;

        let assets = result.assets().unwrap();
        assert!(assets.images.is_empty());
        assert!(assets.video.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sends_expected_body() {
        let transport = ScriptedTransport::new(vec![ok(full_response()), ok(full_response())]);
        let client = client(transport.clone());

        client.generate(&request(true), &mut |_, _| {}).await;
        let mut with_email = request(false);
        with_email.email = "me@example.com".to_string();
        client.generate(&with_email, &mut |_, _| {}).await;

        let bodies = transport.bodies.lock().unwrap();
        assert_eq!(
            bodies[0],
            json!({
                "image_url": "https://cdn.shopify.com/product.jpg",
                "api_key": "longenoughkey123",
                "generate_video": true
            })
        );
        assert_eq!(bodies[1]["email"], "me@example.com");
        assert_eq!(bodies[1]["generate_video"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn non_2xx_prefers_body_message() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Respond(401, "Unauthorized", json!({"error": "Invalid API key"}).to_string()),
            Scripted::Respond(400, "Bad Request", json!({"message": "Image too small"}).to_string()),
            Scripted::Respond(502, "Bad Gateway", "<html>upstream</html>".to_string()),
        ]);
        let client = client(transport);

        let first = client.generate(&request(false), &mut |_, _| {}).await;
        let second = client.generate(&request(false), &mut |_, _| {}).await;
        let third = client.generate(&request(false), &mut |_, _| {}).await;

        assert_eq!(first.error(), Some("Invalid API key"));
        assert_eq!(second.error(), Some("Image too small"));
        assert_eq!(third.error(), Some("HTTP 502: Bad Gateway"));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_failure_flag_is_a_failure() {
        let transport = ScriptedTransport::new(vec![
            ok(json!({"success": false, "error": "Quota exceeded"})),
            ok(json!({"image": {}})),
            Scripted::Respond(200, "OK", "not json".to_string()),
        ]);
        let client = client(transport);
        let mut log = Recorded::new();

        let quota = client.generate(&request(false), &mut recorder(&mut log)).await;
        let absent = client.generate(&request(false), &mut |_, _| {}).await;
        let garbage = client.generate(&request(false), &mut |_, _| {}).await;

        assert_eq!(quota.error(), Some("Quota exceeded"));
        assert_eq!(absent.error(), Some("Generation failed"));
        assert!(!garbage.is_success());
        assert!(!garbage.error().unwrap().is_empty());
        // Failures stop before the image ramp.
        assert_eq!(log.iter().map(|(p, _)| *p).max(), Some(20));
        assert!((quota.processing_time - 0.5).abs() < 0.2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_request_times_out_after_ninety_seconds() {
        let transport = ScriptedTransport::new(vec![Scripted::Hang]);
        let mut log = Recorded::new();

        let result = client(transport).generate(&request(false), &mut recorder(&mut log)).await;

        assert!(!result.is_success());
        assert_eq!(
            result.error(),
            Some("Request timed out after 90 seconds. Please try again.")
        );
        assert!(result.processing_time >= 90.0);
        assert!(result.processing_time < 91.0);
        assert_eq!(log.last().map(|(p, _)| *p), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_normalized() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Fail(TransportError::Connect("tcp connect error".to_string())),
            Scripted::Fail(TransportError::Other("connection reset mid-body".to_string())),
        ]);
        let client = client(transport);

        let offline = client.generate(&request(false), &mut |_, _| {}).await;
        let reset = client.generate(&request(false), &mut |_, _| {}).await;

        assert_eq!(offline.error(), Some(NETWORK_ERROR));
        assert_eq!(reset.error(), Some("connection reset mid-body"));
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn remote_rejections_stay_below_the_default_log_level() {
        let captured = CapturedLog::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let transport = ScriptedTransport::new(vec![
            ok(json!({"success": false, "error": "Invalid API key"})),
            Scripted::Fail(TransportError::Connect("refused".to_string())),
        ]);
        let client = client(transport);
        let rejected = client.generate(&request(false), &mut |_, _| {}).await;
        let offline = client.generate(&request(false), &mut |_, _| {}).await;

        assert!(!rejected.is_success());
        assert!(!offline.is_success());
        assert!(captured.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts_with_last_error() {
        let transport = ScriptedTransport::new(vec![
            ok(json!({"success": false, "error": "first"})),
            ok(json!({"success": false, "error": "second"})),
            ok(json!({"success": false, "error": "third"})),
        ]);
        let client = client(transport.clone());
        let mut log = Recorded::new();
        let started = Instant::now();

        let err = client
            .retry_generate(&request(false), &mut recorder(&mut log), 3)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RetriesExhausted(ref m) if m == "third"));
        assert_eq!(transport.calls(), 3);
        // Two inter-attempt pauses of five seconds.
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(log.contains(&(0, Some("Attempt 3/3...".to_string()))));
        assert_eq!(
            log.iter().filter(|(_, s)| s.as_deref() == Some("Retrying in 5 seconds...")).count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_returns_first_success() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Fail(TransportError::Connect("refused".to_string())),
            ok(full_response()),
            ok(full_response()),
        ]);
        let client = client(transport.clone());

        let result = client
            .retry_generate(&request(false), &mut |_, _| {}, 3)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_with_zero_attempts_uses_fallback_message() {
        let transport = ScriptedTransport::new(vec![]);
        let err = client(transport.clone())
            .retry_generate(&request(false), &mut |_, _| {}, 0)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "All retry attempts failed");
        assert_eq!(transport.calls(), 0);
    }
}
