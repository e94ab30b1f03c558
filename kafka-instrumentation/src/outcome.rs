use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::protocol::{BrokerError, KafkaErrorCode};

pub const SUCCESS: &str = "success";
pub const FAILURE: &str = "failure";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure(FailureReason),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => SUCCESS,
            Outcome::Failure(_) => FAILURE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            Outcome::Success => None,
            Outcome::Failure(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a produce or consume unit failed. Exactly one reason is attached to each failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The operation deadline passed.
    Timeout,
    /// The operation was explicitly canceled.
    Canceled,
    /// The broker answered with a structured protocol error.
    Protocol(KafkaErrorCode),
    /// Anything else, including a closed or unavailable client.
    Unknown,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Canceled => "canceled",
            FailureReason::Protocol(code) => code.message(),
            FailureReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deadline and cancellation state of the caller that issued a produce or consume call.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
    metadata: BTreeMap<String, String>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Attaches a key value pair that producers forward as a header on every record sent
    /// under this context.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    pub fn is_canceled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// The reason this context is done, if it is. An expired deadline wins over cancellation.
    pub fn done_reason(&self) -> Option<FailureReason> {
        if self.is_expired() {
            Some(FailureReason::Timeout)
        } else if self.is_canceled() {
            Some(FailureReason::Canceled)
        } else {
            None
        }
    }

    /// Resolves once the deadline passes or the context is canceled, never otherwise.
    pub async fn done(&self) {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                None => std::future::pending::<()>().await,
            }
        };
        let canceled = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = expired => {}
            _ = canceled => {}
        }
    }
}

/// Map the result of a broker operation to an outcome.
///
/// The context is consulted before the error itself: once a deadline has passed or the
/// caller canceled, the client error text depends on transport state and is not a stable
/// label.
pub fn classify<E>(result: Result<(), &E>, ctx: &OperationContext) -> Outcome
where
    E: BrokerError + ?Sized,
{
    let err = match result {
        Ok(()) => return Outcome::Success,
        Err(err) => err,
    };

    if let Some(reason) = ctx.done_reason() {
        return Outcome::Failure(reason);
    }

    match err.protocol_code() {
        Some(code) => Outcome::Failure(FailureReason::Protocol(code)),
        None => Outcome::Failure(FailureReason::Unknown),
    }
}
