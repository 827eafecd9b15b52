//! Circuit breaker guarding calls into a broker transport
//!
//! The breaker is a three-state machine (closed, open, half-open) evaluated
//! lazily at the top of every [`CircuitBreaker::call`], [`is_open`] and
//! [`is_closed`] invocation; there is no background timer task. Once the
//! failure threshold trips, calls fail fast with
//! [`BrokerError::CircuitOpen`] instead of blocking on a failing resource.
//!
//! State lives inline and is not synchronized: each protected resource owns
//! its own breaker used from one logical execution context at a time, which
//! the `&mut self` receivers make explicit.
//!
//! [`is_open`]: CircuitBreaker::is_open
//! [`is_closed`]: CircuitBreaker::is_closed

use crate::error::BrokerError;
use crate::Result;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; calls pass through
    Closed,
    /// Failing fast; calls are rejected without invoking the action
    Open,
    /// Probing recovery with a bounded number of trial calls
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker tuning parameters
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures while closed before the circuit opens
    pub failure_threshold: u32,
    /// Consecutive successes while half-open before the circuit closes
    pub success_threshold: u32,
    /// Cooldown before an open circuit admits a trial call
    pub timeout: Duration,
    /// Trial-call budget while half-open; exhausting it reopens the circuit
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            half_open_max_attempts: 3,
        }
    }
}

/// Fault-isolation state machine wrapping calls to one protected resource.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    created_at: Instant,
    last_failure_at: Option<Instant>,
    last_state_change_at: Instant,
}

/// Snapshot of breaker state for health reporting.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Time since the breaker was constructed
    pub uptime: Duration,
    /// Time spent in the current state
    pub time_in_state: Duration,
    /// Time since the most recent recorded failure
    pub last_failure_age: Option<Duration>,
}

impl CircuitBreaker {
    pub fn new<N: Into<String>>(name: N, config: CircuitBreakerConfig) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            created_at: now,
            last_failure_at: None,
            last_state_change_at: now,
        }
    }

    /// Run `action` under the breaker.
    ///
    /// Evaluates pending state transitions first, then either rejects the
    /// call with [`BrokerError::CircuitOpen`] or runs the action and records
    /// its outcome. Errors from the action propagate to the caller after
    /// being recorded.
    pub async fn call<T, F, Fut>(&mut self, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.evaluate_state();

        if self.state == CircuitState::Open {
            return Err(BrokerError::circuit_open(&self.name));
        }

        match action().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Current state without evaluating pending transitions.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether calls would currently be rejected. Evaluates pending
    /// transitions first.
    pub fn is_open(&mut self) -> bool {
        self.evaluate_state();
        self.state == CircuitState::Open
    }

    /// Whether the breaker is in normal operation. Evaluates pending
    /// transitions first.
    pub fn is_closed(&mut self) -> bool {
        self.evaluate_state();
        self.state == CircuitState::Closed
    }

    /// Force the breaker back to closed. Operator escape hatch.
    pub fn reset(&mut self) {
        warn!(breaker = %self.name, "circuit breaker manually reset");
        self.transition(CircuitState::Closed);
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            name: self.name.clone(),
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            uptime: self.created_at.elapsed(),
            time_in_state: self.last_state_change_at.elapsed(),
            last_failure_age: self.last_failure_at.map(|at| at.elapsed()),
        }
    }

    /// Lazy on-access transition check: an open circuit moves to half-open
    /// once the cooldown has elapsed.
    fn evaluate_state(&mut self) {
        if self.state == CircuitState::Open
            && self.last_state_change_at.elapsed() >= self.config.timeout
        {
            self.transition(CircuitState::HalfOpen);
        }
    }

    fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.config.success_threshold {
                    self.transition(CircuitState::Closed);
                } else if self.success_count + self.failure_count
                    >= self.config.half_open_max_attempts
                {
                    // Trial budget spent without proving recovery.
                    self.transition(CircuitState::Open);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&mut self) {
        self.last_failure_at = Some(Instant::now());
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold {
                    self.transition(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&mut self, to: CircuitState) {
        if self.state == to {
            return;
        }
        match to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                from = %self.state,
                failures = self.failure_count,
                "circuit opened"
            ),
            _ => debug!(breaker = %self.name, from = %self.state, to = %to, "circuit state change"),
        }
        self.state = to;
        self.failure_count = 0;
        self.success_count = 0;
        self.last_state_change_at = Instant::now();
    }
}
