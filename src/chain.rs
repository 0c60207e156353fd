//! Resilient fetch chain: try a primary source, fall back to secondaries, and
//! finally degrade to a placeholder.
//!
//! Each strategy runs exactly once, strictly in order, and the chain stops at
//! the first success. No backoff or retry happens here. A chain that ends in a
//! [`FetchChain::placeholder`] is total: it always yields a value.
//!
//! ```ignore
//! let report = FetchChain::new("weibo-trending")
//!     .attempt("mobile-api", || fetch_mobile(http))
//!     .attempt("mobile-lite", || fetch_lite(http))
//!     .placeholder("placeholder", || vec![TrendingItem::placeholder(..)])
//!     .run()
//!     .await;
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;
use itertools::Itertools;
use std::fmt;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::FetchError;

/// Tagged result of a degradable operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The preferred path produced the value.
    Ok(T),
    /// A value was produced, but by a fallback.
    Degraded { value: T, reason: String },
    /// Nothing could be produced.
    Failed(String),
}

impl<T> Outcome<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Ok(v) | Outcome::Degraded { value: v, .. } => Some(v),
            Outcome::Failed(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Ok(v) | Outcome::Degraded { value: v, .. } => Some(v),
            Outcome::Failed(_) => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, Outcome::Ok(_))
    }

    /// Why the preferred path was not used, if it wasn't.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Degraded { reason, .. } | Outcome::Failed(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Primary,
    Secondary,
    Placeholder,
}

/// Record of one executed strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchAttempt {
    pub strategy: String,
    pub kind: StrategyKind,
    /// `None` on success.
    pub error: Option<String>,
}

/// What a chain produced, plus the attempts it took to get there.
#[derive(Debug)]
pub struct ChainReport<T> {
    pub outcome: Outcome<T>,
    pub attempts: Vec<FetchAttempt>,
}

impl<T> ChainReport<T> {
    /// One-line summary of the executed strategies, in order.
    pub fn trail(&self) -> String {
        self.attempts
            .iter()
            .map(|a| match &a.error {
                Some(e) => format!("{}({:?}) failed: {e}", a.strategy, a.kind),
                None => format!("{}({:?}) ok", a.strategy, a.kind),
            })
            .join(" -> ")
    }

    /// Unwrap the outcome, logging the trail when it is not a clean success.
    pub fn into_outcome(self) -> Outcome<T> {
        if self.outcome.is_degraded() {
            debug!(attempts = self.attempts.len(), trail = %self.trail(), "Fetch chain trail");
        }
        self.outcome
    }
}

type StrategyFn<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, Result<T, FetchError>> + Send + 'a>;
type PlaceholderFn<'a, T> = Box<dyn FnOnce() -> T + Send + 'a>;

struct Strategy<'a, T> {
    name: String,
    run: StrategyFn<'a, T>,
}

/// Ordered list of fetch strategies, optionally ending in a placeholder.
pub struct FetchChain<'a, T> {
    name: String,
    strategies: Vec<Strategy<'a, T>>,
    placeholder: Option<(String, PlaceholderFn<'a, T>)>,
}

impl<T> fmt::Debug for FetchChain<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchChain")
            .field("name", &self.name)
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .field("placeholder", &self.placeholder.as_ref().map(|(n, _)| n.as_str()))
            .finish()
    }
}

impl<'a, T: Send + 'a> FetchChain<'a, T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategies: Vec::new(),
            placeholder: None,
        }
    }

    /// Append a fallible strategy. The first one added is the primary.
    pub fn attempt<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'a,
    {
        self.strategies.push(Strategy {
            name: name.into(),
            run: Box::new(move || f().boxed()),
        });
        self
    }

    /// Set the terminal, infallible strategy.
    pub fn placeholder<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'a,
    {
        self.placeholder = Some((name.into(), Box::new(f)));
        self
    }

    /// Execute strategies in order until one succeeds.
    ///
    /// # Panics
    ///
    /// If the chain has neither strategies nor a placeholder.
    #[instrument(level = "info", skip(self), fields(chain = %self.name))]
    pub async fn run(self) -> ChainReport<T> {
        assert!(
            !self.strategies.is_empty() || self.placeholder.is_some(),
            "fetch chain `{}` has no strategies",
            self.name
        );

        let t0 = Instant::now();
        let mut attempts = Vec::with_capacity(self.strategies.len() + 1);
        let mut failures: Vec<String> = Vec::new();

        for (i, strategy) in self.strategies.into_iter().enumerate() {
            let kind = if i == 0 {
                StrategyKind::Primary
            } else {
                StrategyKind::Secondary
            };
            match (strategy.run)().await {
                Ok(value) => {
                    info!(
                        strategy = %strategy.name,
                        ?kind,
                        elapsed_ms = t0.elapsed().as_millis() as u64,
                        "Fetch strategy succeeded"
                    );
                    attempts.push(FetchAttempt {
                        strategy: strategy.name,
                        kind,
                        error: None,
                    });
                    let outcome = if failures.is_empty() {
                        Outcome::Ok(value)
                    } else {
                        Outcome::Degraded {
                            value,
                            reason: failures.join("; "),
                        }
                    };
                    return ChainReport { outcome, attempts };
                }
                Err(e) => {
                    warn!(
                        strategy = %strategy.name,
                        ?kind,
                        transport = e.is_transport(),
                        error = %e,
                        "Fetch strategy failed"
                    );
                    failures.push(format!("{}: {}", strategy.name, e));
                    attempts.push(FetchAttempt {
                        strategy: strategy.name,
                        kind,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let reason = if failures.is_empty() {
            "no fetch strategies configured".to_string()
        } else {
            failures.join("; ")
        };

        match self.placeholder {
            Some((name, make)) => {
                warn!(
                    placeholder = %name,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "All fetch strategies failed; serving placeholder"
                );
                attempts.push(FetchAttempt {
                    strategy: name,
                    kind: StrategyKind::Placeholder,
                    error: None,
                });
                ChainReport {
                    outcome: Outcome::Degraded {
                        value: make(),
                        reason,
                    },
                    attempts,
                }
            }
            None => ChainReport {
                outcome: Outcome::Failed(reason),
                attempts,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    fn log() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    async fn fail(calls: Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Result<i32, FetchError> {
        calls.lock().unwrap().push(name);
        Err(FetchError::format(format!("{name} broke")))
    }

    async fn succeed(
        calls: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        v: i32,
    ) -> Result<i32, FetchError> {
        calls.lock().unwrap().push(name);
        Ok(v)
    }

    #[tokio::test]
    async fn test_primary_success_is_ok() {
        let calls = log();
        let (c1, c2) = (calls.clone(), calls.clone());
        let report = FetchChain::new("t")
            .attempt("a", move || succeed(c1, "a", 7))
            .attempt("b", move || succeed(c2, "b", 8))
            .run()
            .await;

        assert_eq!(report.outcome, Outcome::Ok(7));
        assert_eq!(*calls.lock().unwrap(), vec!["a"]);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].kind, StrategyKind::Primary);
        assert_eq!(report.trail(), "a(Primary) ok");
    }

    #[tokio::test]
    async fn test_fail_fail_succeed_stops_at_third() {
        let calls = log();
        let (c1, c2, c3, c4) = (calls.clone(), calls.clone(), calls.clone(), calls.clone());
        let report = FetchChain::new("t")
            .attempt("a", move || fail(c1, "a"))
            .attempt("b", move || fail(c2, "b"))
            .attempt("c", move || succeed(c3, "c", 42))
            .attempt("d", move || succeed(c4, "d", 99))
            .placeholder("placeholder", || -1)
            .run()
            .await;

        assert_eq!(report.outcome.value(), Some(&42));
        assert!(report.outcome.is_degraded());
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b", "c"]);

        let kinds: Vec<_> = report.attempts.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![StrategyKind::Primary, StrategyKind::Secondary, StrategyKind::Secondary]
        );
        assert!(report.attempts[0].error.as_deref().unwrap().contains("a broke"));
        assert!(report.attempts[2].error.is_none());
        let reason = report.outcome.reason().unwrap();
        assert!(reason.contains("a: ") && reason.contains("b: "));

        let trail = report.trail();
        assert!(trail.starts_with("a(Primary) failed: "));
        assert!(trail.ends_with("c(Secondary) ok"));
        assert_eq!(report.into_outcome().into_value(), Some(42));
    }

    #[tokio::test]
    async fn test_exhaustion_yields_placeholder() {
        let calls = log();
        let (c1, c2) = (calls.clone(), calls.clone());
        let report = FetchChain::new("t")
            .attempt("a", move || fail(c1, "a"))
            .attempt("b", move || fail(c2, "b"))
            .placeholder("placeholder", || 0)
            .run()
            .await;

        match report.outcome {
            Outcome::Degraded { value, ref reason } => {
                assert_eq!(value, 0);
                assert!(reason.contains("b broke"));
            }
            other => panic!("expected placeholder, got {other:?}"),
        }
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.attempts[2].kind, StrategyKind::Placeholder);
    }

    #[tokio::test]
    async fn test_exhaustion_without_placeholder_fails() {
        let calls = log();
        let c1 = calls.clone();
        let report = FetchChain::new("t")
            .attempt("a", move || fail(c1, "a"))
            .run()
            .await;

        assert_eq!(report.outcome, Outcome::Failed("a: unexpected upstream format: a broke".into()));
        assert_eq!(report.outcome.into_value(), None);
    }

    #[tokio::test]
    async fn test_placeholder_only_chain() {
        let report = FetchChain::new("t")
            .placeholder("placeholder", || "stub")
            .run()
            .await;
        assert_eq!(report.outcome.into_value(), Some("stub"));
    }

    #[tokio::test]
    #[should_panic(expected = "has no strategies")]
    async fn test_empty_chain_panics() {
        let chain: FetchChain<'_, i32> = FetchChain::new("empty");
        let _ = chain.run().await;
    }

    #[tokio::test]
    async fn test_strategies_may_borrow() {
        let owned = String::from("borrowed");
        let source = &owned;
        let report = FetchChain::new("t")
            .attempt("a", move || async move { Ok::<_, FetchError>(source.len()) })
            .run()
            .await;
        assert_eq!(report.outcome, Outcome::Ok(8));
    }
}
