//! Fan-out of independent completion calls for one prompt.

use futures::stream::{self, StreamExt};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::completion::{CompletionClient, CompletionRequest, CompletionResult};
use crate::gateway::{backoff_delay, ProviderError};

use super::error::MeasureError;
use super::options::RetryPolicy;
use super::types::{Sample, SampleFailure, SampleSet, SamplingRequest};

pub struct Sampler<'a> {
    client: &'a dyn CompletionClient,
    retry: RetryPolicy,
    parallelism: usize,
}

impl<'a> Sampler<'a> {
    pub fn new(client: &'a dyn CompletionClient, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            parallelism: 1,
        }
    }

    /// Allow up to `n` sample calls in flight. Output order is unaffected.
    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    /// Draw `request.num_samples` completions.
    ///
    /// Identical outputs are kept; they are the diversity signal. A slot that
    /// exhausts its retries is dropped and recorded in `failures`.
    pub async fn sample(
        &self,
        request: &SamplingRequest,
        measurement_id: Uuid,
    ) -> Result<SampleSet, MeasureError> {
        let call = CompletionRequest::new(&request.prompt, request.temperature, request.max_tokens)
            .measurement(measurement_id);

        // `buffered` yields in input order regardless of completion order.
        let outcomes: Vec<Result<Sample, SampleFailure>> = stream::iter(0..request.num_samples)
            .map(|index| {
                let call = &call;
                async move {
                    match complete_with_retry(self.client, call, self.retry).await {
                        Ok((result, attempts)) => {
                            debug!(
                                index,
                                attempts,
                                tokens = result.token_logprobs.len(),
                                "sample completed"
                            );
                            Ok(Sample::new(result.text, result.token_logprobs))
                        }
                        Err((err, attempts)) => {
                            warn!(index, attempts, code = err.code(), error = %err, "sample dropped");
                            Err(SampleFailure {
                                index,
                                attempts,
                                code: err.code(),
                                message: err.to_string(),
                            })
                        }
                    }
                }
            })
            .buffered(self.parallelism)
            .collect()
            .await;

        let mut samples = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(sample) => samples.push(sample),
                Err(failure) => failures.push(failure),
            }
        }

        if samples.is_empty() {
            return Err(MeasureError::AllSamplesFailed {
                requested: request.num_samples,
                failures,
            });
        }

        Ok(SampleSet {
            samples,
            requested: request.num_samples,
            failures,
        })
    }
}

/// One completion with retries on retryable errors.
///
/// A rate limit's `retry_after` is a floor on the wait. Returns the attempt count
/// alongside the result or the last error.
pub(crate) async fn complete_with_retry(
    client: &dyn CompletionClient,
    req: &CompletionRequest,
    retry: RetryPolicy,
) -> Result<(CompletionResult, u32), (ProviderError, u32)> {
    let mut attempt = 0u32;
    loop {
        match client.complete(req).await {
            Ok(result) => return Ok((result, attempt + 1)),
            Err(err) => {
                if !err.is_retryable() || attempt >= retry.max_retries {
                    return Err((err, attempt + 1));
                }
                let backoff = backoff_delay(retry.base_delay, attempt);
                let delay = match &err {
                    ProviderError::RateLimited { retry_after, .. } => (*retry_after).max(backoff),
                    _ => backoff,
                };
                debug!(
                    attempt,
                    code = err.code(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying completion"
                );
                attempt += 1;
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ErrorContext, TokenLogprob};
    use crate::uncertainty::decision::most_representative;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Replays scripted outcomes in call order; `None` means a retryable failure.
    struct Scripted {
        outcomes: Mutex<Vec<Option<&'static str>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(outcomes: Vec<Option<&'static str>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into_iter().rev().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        async fn complete(
            &self,
            _req: &CompletionRequest,
        ) -> Result<CompletionResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcomes.lock().unwrap().pop().flatten() {
                Some(text) => Ok(CompletionResult {
                    text: text.to_string(),
                    token_logprobs: vec![TokenLogprob::new(text, -0.1)],
                }),
                None => Err(ProviderError::provider("stub", "transient", true)),
            }
        }
    }

    fn no_delay(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn keeps_duplicates_and_request_order() {
        let client = Scripted::new(vec![Some("b"), Some("a"), Some("b")]);
        let sampler = Sampler::new(&client, no_delay(2));
        let set = sampler
            .sample(&SamplingRequest::new("q").num_samples(3), Uuid::new_v4())
            .await
            .unwrap();

        let texts: Vec<_> = set.samples.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a", "b"]);
        assert_eq!(set.collected(), 3);
        assert!(set.failures.is_empty());
    }

    #[tokio::test]
    async fn retries_recover_a_failed_slot() {
        // slot 0: fail, fail, ok ; slot 1: ok
        let client = Scripted::new(vec![None, None, Some("x"), Some("y")]);
        let sampler = Sampler::new(&client, no_delay(2));
        let set = sampler
            .sample(&SamplingRequest::new("q").num_samples(2), Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(set.collected(), 2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausted_slot_is_dropped_and_recorded() {
        // slot 0: ok ; slot 1: three failures ; slot 2: ok
        let client = Scripted::new(vec![Some("a"), None, None, None, Some("c")]);
        let sampler = Sampler::new(&client, no_delay(2));
        let set = sampler
            .sample(&SamplingRequest::new("q").num_samples(3), Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(set.requested, 3);
        assert_eq!(set.collected(), 2);
        assert_eq!(set.failures.len(), 1);
        assert_eq!(set.failures[0].index, 1);
        assert_eq!(set.failures[0].attempts, 3);
        assert_eq!(set.failures[0].code, "provider_error");
    }

    #[tokio::test]
    async fn every_slot_failing_is_all_samples_failed() {
        let client = Scripted::new(vec![None; 6]);
        let sampler = Sampler::new(&client, no_delay(2));
        let err = sampler
            .sample(&SamplingRequest::new("q").num_samples(2), Uuid::new_v4())
            .await
            .unwrap_err();

        match err {
            MeasureError::AllSamplesFailed {
                requested,
                failures,
            } => {
                assert_eq!(requested, 2);
                assert_eq!(failures.len(), 2);
            }
            other => panic!("expected AllSamplesFailed, got {other:?}"),
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        struct Permanent(AtomicUsize);

        #[async_trait]
        impl CompletionClient for Permanent {
            async fn complete(
                &self,
                _req: &CompletionRequest,
            ) -> Result<CompletionResult, ProviderError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::invalid_request("prompt too large"))
            }
        }

        let client = Permanent(AtomicUsize::new(0));
        let result = complete_with_retry(&client, &CompletionRequest::new("q", 0.7, 10), no_delay(2)).await;
        let (err, attempts) = result.unwrap_err();
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(attempts, 1);
        assert_eq!(client.0.load(Ordering::SeqCst), 1);
    }

    /// Call `n` sleeps `100ms * (5 - n)`, so later calls finish first.
    struct Staggered {
        texts: [&'static str; 5],
        calls: AtomicUsize,
        finished: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl CompletionClient for Staggered {
        async fn complete(
            &self,
            _req: &CompletionRequest,
        ) -> Result<CompletionResult, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100 * (5 - n as u64))).await;
            self.finished.lock().unwrap().push(n);
            let text = self.texts[n];
            Ok(CompletionResult {
                text: text.to_string(),
                token_logprobs: vec![TokenLogprob::new(text, -0.1)],
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_samples_keep_request_order() {
        let client = Staggered {
            texts: ["A", "B", "C", "A", "B"],
            calls: AtomicUsize::new(0),
            finished: Mutex::new(Vec::new()),
        };
        let sampler = Sampler::new(&client, no_delay(0)).parallelism(3);
        let set = sampler
            .sample(&SamplingRequest::new("q").num_samples(5), Uuid::new_v4())
            .await
            .unwrap();

        let finished = client.finished.lock().unwrap().clone();
        assert_eq!(finished.len(), 5);
        assert_eq!(finished[0], 2, "third call is the first to finish");

        let texts: Vec<_> = set.samples.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B", "C", "A", "B"]);
        // "A" and "B" tie on count; the earliest occurrence wins.
        assert_eq!(most_representative(&set.samples), Some("A"));
    }

    /// Rate-limits the first call, then succeeds.
    struct RateLimitedOnce(AtomicUsize);

    #[async_trait]
    impl CompletionClient for RateLimitedOnce {
        async fn complete(
            &self,
            _req: &CompletionRequest,
        ) -> Result<CompletionResult, ProviderError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ProviderError::rate_limited(
                    Duration::from_secs(30),
                    ErrorContext::default(),
                ));
            }
            Ok(CompletionResult {
                text: "ok".to_string(),
                token_logprobs: Vec::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_wait_is_at_least_retry_after() {
        let client = RateLimitedOnce(AtomicUsize::new(0));
        let retry = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        };

        let start = Instant::now();
        let (result, attempts) = complete_with_retry(&client, &CompletionRequest::new("q", 0.7, 10), retry)
            .await
            .unwrap();

        assert_eq!(result.text, "ok");
        assert_eq!(attempts, 2);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_applies_when_longer_than_retry_after() {
        struct ShortRateLimit(AtomicUsize);

        #[async_trait]
        impl CompletionClient for ShortRateLimit {
            async fn complete(
                &self,
                _req: &CompletionRequest,
            ) -> Result<CompletionResult, ProviderError> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(ProviderError::rate_limited(
                        Duration::from_millis(10),
                        ErrorContext::default(),
                    ));
                }
                Ok(CompletionResult {
                    text: "ok".to_string(),
                    token_logprobs: Vec::new(),
                })
            }
        }

        let client = ShortRateLimit(AtomicUsize::new(0));
        let retry = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_secs(2),
        };

        let start = Instant::now();
        complete_with_retry(&client, &CompletionRequest::new("q", 0.7, 10), retry)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
