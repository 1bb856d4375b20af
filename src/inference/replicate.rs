//! Blocking client for the Replicate predictions API.
//!
//! One [`Transformer::transform`] call creates a prediction, polls it until a
//! terminal state, then downloads the first output file.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use super::prediction::{Prediction, PredictionStatus};
use super::{RetryPolicy, Transformer, data_uri, validate_request};
use crate::error::{Error, Result};
use crate::registry::ModelConfig;

/// Environment variable holding the API credential.
pub const TOKEN_ENV_VAR: &str = "REPLICATE_API_KEY";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com";

/// API credential. The value never appears in `Debug` output.
#[derive(Clone)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wrap a token, rejecting blank values.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Authentication("API token is empty".to_string()));
        }
        Ok(Self(token.to_string()))
    }

    /// Read the token from [`TOKEN_ENV_VAR`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the token through a variable lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = lookup(TOKEN_ENV_VAR).ok_or_else(|| {
            Error::Authentication(format!(
                "{TOKEN_ENV_VAR} not found; set it in the environment or a .env file"
            ))
        })?;
        Self::new(value)
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(****)")
    }
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, without trailing slash.
    pub base_url: String,

    /// Delay between status polls.
    pub poll_interval: Duration,

    /// Upper bound on waiting for a prediction to finish.
    pub max_wait: Duration,

    /// Timeout for each individual HTTP request.
    pub request_timeout: Duration,

    /// Retry schedule for transport failures.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(600),
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Set the maximum wait for a prediction.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Replicate API client.
pub struct ReplicateClient {
    http: Client,
    token: ApiToken,
    config: ClientConfig,
}

impl ReplicateClient {
    /// Create a client with an explicit token.
    pub fn new(token: ApiToken, config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("whiteboard-eval/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            token,
            config,
        })
    }

    /// Create a client using the token from the environment.
    ///
    /// Fails with [`Error::Authentication`] before any network activity when
    /// the credential is missing.
    pub fn from_env(config: ClientConfig) -> Result<Self> {
        Self::new(ApiToken::from_env()?, config)
    }

    /// Client settings.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn create_prediction(
        &self,
        model: &ModelConfig,
        input: &serde_json::Value,
    ) -> Result<Prediction> {
        let url = format!(
            "{}/v1/models/{}/predictions",
            self.config.base_url, model.endpoint
        );
        let body = json!({ "input": input });

        self.config.retry.run("create prediction", || {
            let response = self
                .http
                .post(&url)
                .bearer_auth(self.token.expose())
                .json(&body)
                .send()
                .map_err(request_error)?;
            read_json(response, &model.id)
        })
    }

    fn get_prediction(&self, url: &str, model: &ModelConfig) -> Result<Prediction> {
        self.config.retry.run("poll prediction", || {
            let response = self
                .http
                .get(url)
                .bearer_auth(self.token.expose())
                .send()
                .map_err(request_error)?;
            read_json(response, &model.id)
        })
    }

    fn cancel(&self, prediction: &Prediction) {
        let Some(url) = prediction.urls.cancel.as_deref() else {
            return;
        };
        if let Err(e) = self.http.post(url).bearer_auth(self.token.expose()).send() {
            warn!(id = %prediction.id, %e, "failed to cancel prediction");
        }
    }

    /// Poll until the prediction is terminal or `max_wait` elapses.
    fn wait(&self, mut prediction: Prediction, model: &ModelConfig) -> Result<Prediction> {
        let started = Instant::now();
        let fallback = || format!("{}/v1/predictions/{}", self.config.base_url, prediction.id);
        let poll_url = prediction.urls.get.clone().unwrap_or_else(fallback);

        while !prediction.status.is_terminal() {
            if started.elapsed() >= self.config.max_wait {
                self.cancel(&prediction);
                return Err(Error::Timeout {
                    model: model.id.clone(),
                    waited: started.elapsed(),
                });
            }
            std::thread::sleep(self.config.poll_interval);
            prediction = self.get_prediction(&poll_url, model)?;
            debug!(id = %prediction.id, status = ?prediction.status, "polled prediction");
        }

        Ok(prediction)
    }

    fn download(&self, url: &str, model: &ModelConfig) -> Result<Vec<u8>> {
        self.config.retry.run("download output", || {
            let response = self.http.get(url).send().map_err(request_error)?;
            let response = check_status(response, &model.id)?;
            let bytes = response.bytes().map_err(request_error)?;
            if bytes.is_empty() {
                return Err(Error::Inference {
                    model: model.id.clone(),
                    message: "output file is empty".to_string(),
                });
            }
            Ok(bytes.to_vec())
        })
    }
}

impl Transformer for ReplicateClient {
    fn transform(&self, image: &[u8], model: &ModelConfig, prompt: &str) -> Result<Vec<u8>> {
        let format = validate_request(image, prompt)?;
        let input = model.build_input(prompt, &data_uri(image, format));

        let prediction = self.create_prediction(model, &input)?;
        info!(model = %model.id, id = %prediction.id, "prediction created");

        let prediction = self.wait(prediction, model)?;
        match prediction.status {
            PredictionStatus::Succeeded => {}
            PredictionStatus::Canceled => {
                return Err(Error::Inference {
                    model: model.id.clone(),
                    message: "prediction was canceled".to_string(),
                });
            }
            _ => {
                return Err(Error::Inference {
                    model: model.id.clone(),
                    message: prediction
                        .error_message()
                        .unwrap_or_else(|| "prediction failed".to_string()),
                });
            }
        }

        let url = prediction.output_url().ok_or_else(|| Error::Inference {
            model: model.id.clone(),
            message: "no image was generated in the response".to_string(),
        })?;
        self.download(url, model)
    }
}

fn request_error(e: reqwest::Error) -> Error {
    Error::Transport {
        message: e.to_string(),
        status: e.status().map(|s| s.as_u16()),
    }
}

fn check_status(response: Response, model: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(classify_status(status.as_u16(), &body, model))
}

fn read_json<T: DeserializeOwned>(response: Response, model: &str) -> Result<T> {
    let response = check_status(response, model)?;
    let bytes = response.bytes().map_err(request_error)?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Inference {
        model: model.to_string(),
        message: format!("malformed response: {e}"),
    })
}

/// Map an unsuccessful HTTP status to an error kind.
pub(crate) fn classify_status(status: u16, body: &str, model: &str) -> Error {
    let detail = extract_detail(body);
    match status {
        401 | 403 => Error::Authentication(format!("HTTP {status}: {detail}")),
        429 | 500..=599 => Error::Transport {
            message: format!("HTTP {status}: {detail}"),
            status: Some(status),
        },
        _ => Error::Inference {
            model: model.to_string(),
            message: format!("HTTP {status}: {detail}"),
        },
    }
}

/// Pull the `detail` field out of an API error body, falling back to the raw text.
fn extract_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::registry::ImageInput;
    use crate::test_support::png_bytes;

    /// A request seen by the stub server.
    #[derive(Debug, Clone)]
    struct Seen {
        method: String,
        path: String,
        authorized: bool,
    }

    /// Serve canned responses on a local port, one connection per request.
    ///
    /// `respond` gets the base URL, method and path, and returns status and
    /// JSON body.
    fn serve<F>(mut respond: F) -> (String, Arc<Mutex<Vec<Seen>>>)
    where
        F: FnMut(&str, &str, &str) -> (u16, Vec<u8>) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        let server_base = base.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let mut parts = line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let path = parts.next().unwrap_or_default().to_string();

                let mut length = 0;
                let mut authorized = false;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    let header = header.trim_end();
                    if header.is_empty() {
                        break;
                    }
                    let (name, value) = header.split_once(':').unwrap_or((header, ""));
                    match name.to_ascii_lowercase().as_str() {
                        "content-length" => length = value.trim().parse().unwrap(),
                        "authorization" => authorized = value.trim() == "Bearer r8_test",
                        _ => {}
                    }
                }
                let mut body = vec![0; length];
                reader.read_exact(&mut body).unwrap();

                log.lock().unwrap().push(Seen {
                    method: method.clone(),
                    path: path.clone(),
                    authorized,
                });
                let (status, payload) = respond(&server_base, &method, &path);
                let head = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n",
                    payload.len()
                );
                stream.write_all(head.as_bytes()).unwrap();
                stream.write_all(&payload).unwrap();
                stream.flush().unwrap();
            }
        });

        (base, seen)
    }

    fn prediction(base: &str, status: &str, output: serde_json::Value) -> Vec<u8> {
        json!({
            "id": "p1",
            "status": status,
            "output": output,
            "urls": {
                "get": format!("{base}/v1/predictions/p1"),
                "cancel": format!("{base}/v1/predictions/p1/cancel"),
            },
        })
        .to_string()
        .into_bytes()
    }

    /// A succeeded prediction whose output lives at `<base>/o`.
    fn finished(base: &str) -> Vec<u8> {
        prediction(base, "succeeded", json!(format!("{base}/o")))
    }

    fn client(base: &str) -> ReplicateClient {
        let config = ClientConfig {
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
            ..ClientConfig::default()
        }
        .with_base_url(base)
        .with_poll_interval(Duration::from_millis(5))
        .with_max_wait(Duration::from_millis(200));
        let token = ApiToken::new("r8_test").unwrap();
        ReplicateClient::new(token, config).unwrap()
    }

    fn model() -> ModelConfig {
        ModelConfig::new("cleanup", "acme/cleanup", ImageInput::single("image"))
    }

    fn run(base: &str) -> Result<Vec<u8>> {
        let image = png_bytes(2, 2, [255, 255, 255, 255]);
        client(base).transform(&image, &model(), "clean the board")
    }

    fn requests(seen: &Arc<Mutex<Vec<Seen>>>) -> Vec<String> {
        let line = |r: &Seen| format!("{} {}", r.method, r.path);
        seen.lock().unwrap().iter().map(line).collect()
    }

    const CREATE: &str = "/v1/models/acme/cleanup/predictions";
    const CANCEL: &str = "/v1/predictions/p1/cancel";

    #[test]
    fn test_missing_token_is_authentication_error() {
        let result = ApiToken::from_lookup(|_| None);
        assert!(matches!(result, Err(Error::Authentication(_))));

        let result = ApiToken::from_lookup(|_| Some("   ".to_string()));
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_token_lookup_uses_env_var_name() {
        let token = ApiToken::from_lookup(|name| {
            (name == TOKEN_ENV_VAR).then(|| "r8_secret\n".to_string())
        })
        .unwrap();
        assert_eq!(token.expose(), "r8_secret");
        assert_eq!(format!("{token:?}"), "ApiToken(****)");
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(401, r#"{"detail":"Invalid token."}"#, "m"),
            Error::Authentication(ref msg) if msg.contains("Invalid token.")
        ));
        assert!(matches!(
            classify_status(429, "", "m"),
            Error::Transport {
                status: Some(429),
                ..
            }
        ));
        assert!(matches!(classify_status(503, "", "m"), Error::Transport { .. }));
        assert!(matches!(
            classify_status(422, r#"{"detail":"input.image is required"}"#, "m"),
            Error::Inference { ref message, .. } if message.contains("input.image is required")
        ));
    }

    #[test]
    fn test_config_builders() {
        let config = ClientConfig::default()
            .with_base_url("http://localhost:9999/")
            .with_max_wait(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(10));
        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.max_wait, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_client_construction_makes_no_requests() {
        let token = ApiToken::new("r8_test").unwrap();
        let client = ReplicateClient::new(token, ClientConfig::default()).unwrap();
        assert_eq!(client.config().base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_transform_polls_then_downloads() {
        let (base, seen) = serve(|base, method, path| match (method, path) {
            ("POST", CREATE) => (201, prediction(base, "starting", json!(null))),
            ("GET", "/v1/predictions/p1") => {
                let output = json!([format!("{base}/files/out.png")]);
                (200, prediction(base, "succeeded", output))
            }
            ("GET", "/files/out.png") => (200, b"output bytes".to_vec()),
            _ => (404, b"{}".to_vec()),
        });

        assert_eq!(run(&base).unwrap(), b"output bytes");
        assert_eq!(
            requests(&seen),
            [
                format!("POST {CREATE}"),
                "GET /v1/predictions/p1".into(),
                "GET /files/out.png".into(),
            ]
        );

        let seen = seen.lock().unwrap();
        assert!(seen[0].authorized && seen[1].authorized);
        assert!(!seen[2].authorized);
    }

    #[test]
    fn test_polls_fallback_url_without_urls() {
        let (base, seen) = serve(|base, method, path| match (method, path) {
            ("POST", CREATE) => (201, br#"{"id":"p9","status":"processing"}"#.to_vec()),
            ("GET", "/v1/predictions/p9") => {
                let body = json!({
                    "id": "p9",
                    "status": "succeeded",
                    "output": format!("{base}/o"),
                });
                (200, body.to_string().into_bytes())
            }
            ("GET", "/o") => (200, b"png".to_vec()),
            _ => (404, b"{}".to_vec()),
        });

        assert_eq!(run(&base).unwrap(), b"png");
        assert_eq!(requests(&seen)[1], "GET /v1/predictions/p9");
    }

    #[test]
    fn test_timeout_cancels_prediction() {
        let (base, seen) = serve(|base, method, path| match (method, path) {
            ("POST", CREATE) => (201, prediction(base, "starting", json!(null))),
            ("GET", _) => (200, prediction(base, "processing", json!(null))),
            ("POST", CANCEL) => (200, prediction(base, "canceled", json!(null))),
            _ => (404, b"{}".to_vec()),
        });

        let result = run(&base);
        assert!(matches!(result, Err(Error::Timeout { ref model, .. }) if model == "cleanup"));
        let requests = requests(&seen);
        assert_eq!(requests.last().unwrap(), &format!("POST {CANCEL}"));
    }

    #[test]
    fn test_failed_prediction_is_inference_error() {
        let (base, _) = serve(|base, method, _| match method {
            "POST" => (201, prediction(base, "starting", json!(null))),
            _ => {
                let body = json!({
                    "id": "p1",
                    "status": "failed",
                    "error": "NSFW content detected",
                });
                (200, body.to_string().into_bytes())
            }
        });

        assert!(matches!(
            run(&base),
            Err(Error::Inference { ref message, .. }) if message == "NSFW content detected"
        ));
    }

    #[test]
    fn test_canceled_prediction_is_inference_error() {
        let (base, seen) = serve(|base, method, _| match method {
            "POST" => (201, prediction(base, "starting", json!(null))),
            _ => (200, prediction(base, "canceled", json!(null))),
        });

        assert!(matches!(
            run(&base),
            Err(Error::Inference { ref message, .. }) if message.contains("canceled")
        ));
        assert!(!requests(&seen).iter().any(|r| r.ends_with("/cancel")));
    }

    #[test]
    fn test_server_errors_are_retried() {
        let mut creates = 0;
        let (base, seen) = serve(move |base, method, path| match (method, path) {
            ("POST", CREATE) => {
                creates += 1;
                if creates < 3 {
                    (503, br#"{"detail":"overloaded"}"#.to_vec())
                } else {
                    (201, finished(base))
                }
            }
            ("GET", "/o") => (200, b"png".to_vec()),
            _ => (404, b"{}".to_vec()),
        });

        assert_eq!(run(&base).unwrap(), b"png");
        let requests = requests(&seen);
        let posts = requests.iter().filter(|r| r.starts_with("POST")).count();
        assert_eq!(posts, 3);
    }

    #[test]
    fn test_rate_limit_exhausts_retries_as_transport() {
        let (base, seen) = serve(|_, _, _| (429, br#"{"detail":"slow down"}"#.to_vec()));

        let result = run(&base);
        assert!(matches!(
            result,
            Err(Error::Transport {
                status: Some(429),
                ref message,
            }) if message.contains("slow down")
        ));
        assert_eq!(requests(&seen).len(), 3);
    }

    #[test]
    fn test_rejected_credential_while_polling() {
        let (base, seen) = serve(|base, method, _| match method {
            "POST" => (201, prediction(base, "starting", json!(null))),
            _ => (401, br#"{"detail":"Invalid token."}"#.to_vec()),
        });

        let result = run(&base);
        assert!(matches!(result, Err(ref e @ Error::Authentication(_)) if e.is_fatal()));
        // 401 is not retried
        assert_eq!(requests(&seen).len(), 2);
    }

    #[test]
    fn test_empty_download_is_inference_error() {
        let (base, _) = serve(|base, method, path| match (method, path) {
            ("POST", _) => (201, finished(base)),
            _ => (200, Vec::new()),
        });

        assert!(matches!(
            run(&base),
            Err(Error::Inference { ref message, .. }) if message.contains("empty")
        ));
    }

    #[test]
    fn test_missing_output_is_inference_error() {
        let (base, seen) = serve(|base, _, _| (201, prediction(base, "succeeded", json!(null))));

        assert!(matches!(
            run(&base),
            Err(Error::Inference { ref message, .. }) if message.contains("no image")
        ));
        assert_eq!(requests(&seen).len(), 1);
    }

    #[test]
    fn test_invalid_image_fails_before_network() {
        let (base, seen) = serve(|_, _, _| (500, Vec::new()));

        let result = client(&base).transform(b"not an image", &model(), "clean");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(requests(&seen).is_empty());
    }
}
