// HTTP client configuration and reachability probing

use audiowave_core::{AudioError, CancelToken, HttpConfig, Result};
use std::time::Duration;

/// Create a configured HTTP agent
pub fn create_http_agent(config: &HttpConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(config.connect_timeout)
        .timeout_read(config.read_timeout)
        .timeout_write(config.write_timeout)
        .user_agent(&config.user_agent)
        .redirects(config.redirects)
        .build()
}

/// What the server told us about a remote resource
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub content_length: Option<u64>,
    pub accepts_ranges: bool,
    pub content_type: Option<String>,
}

/// HTTP client wrapper
#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            agent: create_http_agent(&config),
            config,
        }
    }

    pub fn agent(&self) -> &ureq::Agent {
        &self.agent
    }

    pub fn get_with_range(&self, url: &str, start: u64, end: Option<u64>) -> Result<ureq::Response> {
        let range = match end {
            Some(e) => format!("bytes={}-{}", start, e),
            None => format!("bytes={}-", start),
        };

        self.agent
            .get(url)
            .set("Range", &range)
            .call()
            .map_err(|e| AudioError::NetworkError(format!("HTTP Range GET failed: {}", e)))
    }

    /// Check that `url` is reachable and learn its size.
    ///
    /// Tries HEAD first and falls back to a one-byte range request for
    /// servers that reject HEAD. Retries with exponential backoff; every wait
    /// checks `cancel` so a superseded load returns promptly.
    pub fn probe(&self, url: &str, cancel: &CancelToken) -> Result<ProbeInfo> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            cancel.check()?;
            if attempt > 0 {
                let delay = Duration::from_millis(250 * 2u64.pow(attempt - 1));
                log::warn!("Probe attempt {} failed, retrying after {:?}", attempt, delay);
                sleep_unless_cancelled(delay, cancel)?;
            }

            match self.probe_once(url) {
                Ok(info) => return Ok(info),
                Err(e) => last_error = Some(e),
            }
        }

        Err(AudioError::ResourceUnavailable(format!(
            "{} unreachable after {} attempts: {}",
            url,
            self.config.max_retries + 1,
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".to_string())
        )))
    }

    fn probe_once(&self, url: &str) -> Result<ProbeInfo> {
        match self.agent.head(url).call() {
            Ok(response) => Ok(ProbeInfo {
                content_length: response
                    .header("Content-Length")
                    .and_then(|s| s.parse::<u64>().ok()),
                accepts_ranges: response
                    .header("Accept-Ranges")
                    .map(|v| v.eq_ignore_ascii_case("bytes"))
                    .unwrap_or(false),
                content_type: response.header("Content-Type").map(str::to_string),
            }),
            Err(ureq::Error::Status(code, _)) if code == 404 || code == 410 => Err(
                AudioError::ResourceUnavailable(format!("HTTP {} for {}", code, url)),
            ),
            Err(head_err) => {
                log::debug!("HEAD failed ({}), trying range request", head_err);
                let response = self.get_with_range(url, 0, Some(0))?;
                let total = response
                    .header("Content-Range")
                    .and_then(parse_total_from_content_range);
                Ok(ProbeInfo {
                    content_length: total.or_else(|| {
                        response
                            .header("Content-Length")
                            .and_then(|s| s.parse::<u64>().ok())
                    }),
                    accepts_ranges: response.status() == 206,
                    content_type: response.header("Content-Type").map(str::to_string),
                })
            }
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(HttpConfig::default())
    }
}

/// `bytes 0-0/12345` -> 12345
pub fn parse_total_from_content_range(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse::<u64>().ok()
}

fn sleep_unless_cancelled(total: Duration, cancel: &CancelToken) -> Result<()> {
    let step = Duration::from_millis(20);
    let mut waited = Duration::ZERO;
    while waited < total {
        cancel.check()?;
        std::thread::sleep(step);
        waited += step;
    }
    cancel.check()
}
