//! Constraints negotiation: chunk size and file-size ceiling.

use filesvc_protocol::ProtocolVersion;
use filesvc_protocol::constants::MAX_CHUNK_PAYLOAD;
use filesvc_protocol::messages::ConstraintsResponse;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{TransferError, TransferFuture};

/// Limits a server advertises for transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    /// Largest chunk payload in bytes. Always positive once validated.
    pub max_chunk_size: u32,
    /// Largest total file size in bytes; 0 means no ceiling below `u32::MAX`.
    pub max_file_size: u32,
}

impl Constraints {
    /// Builds validated constraints.
    pub fn new(max_chunk_size: u32, max_file_size: u32) -> Result<Self, TransferError> {
        let c = Self {
            max_chunk_size,
            max_file_size,
        };
        c.validate()?;
        Ok(c)
    }

    /// Rejects constraints a writer cannot make progress with.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.max_chunk_size == 0 {
            return Err(TransferError::Negotiation(
                "server advertised a zero chunk size".into(),
            ));
        }
        if self.max_chunk_size as usize > MAX_CHUNK_PAYLOAD {
            return Err(TransferError::Negotiation(format!(
                "chunk size {} exceeds frame limit {MAX_CHUNK_PAYLOAD}",
                self.max_chunk_size
            )));
        }
        Ok(())
    }

    /// File-size ceiling, if one is advertised.
    pub fn file_limit(&self) -> Option<u32> {
        (self.max_file_size > 0).then_some(self.max_file_size)
    }
}

impl From<ConstraintsResponse> for Constraints {
    fn from(r: ConstraintsResponse) -> Self {
        Self {
            max_chunk_size: r.max_batch_size,
            max_file_size: r.max_file_size,
        }
    }
}

impl From<Constraints> for ConstraintsResponse {
    fn from(c: Constraints) -> Self {
        Self {
            max_batch_size: c.max_chunk_size,
            max_file_size: c.max_file_size,
        }
    }
}

/// Remote endpoint that can be asked for its constraints.
pub trait ConstraintsSource: Send + Sync {
    /// Fetches constraints. Unreachable peers and malformed replies are
    /// [`TransferError::Negotiation`].
    fn fetch_constraints(&self) -> TransferFuture<'_, Result<Constraints, TransferError>>;
}

/// How often a client negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationPolicy {
    /// Fetch once per session and reuse.
    #[default]
    Session,
    /// Fetch again immediately before every upload.
    EveryUpload,
}

impl From<ProtocolVersion> for NegotiationPolicy {
    fn from(v: ProtocolVersion) -> Self {
        match v {
            ProtocolVersion::InlineFilename => Self::Session,
            ProtocolVersion::HeaderFilename => Self::EveryUpload,
        }
    }
}

/// Caches the session's constraints.
///
/// The session value is published once and then only read, so concurrent
/// transfers share it without further locking.
#[derive(Debug, Default)]
pub struct Negotiator {
    policy: NegotiationPolicy,
    session: OnceCell<Constraints>,
}

impl Negotiator {
    pub fn new(policy: NegotiationPolicy) -> Self {
        Self {
            policy,
            session: OnceCell::new(),
        }
    }

    pub fn policy(&self) -> NegotiationPolicy {
        self.policy
    }

    /// The session constraints, if they were fetched already.
    pub fn cached(&self) -> Option<Constraints> {
        self.session.get().copied()
    }

    /// Constraints for the next upload, per the policy.
    pub async fn for_upload<S>(&self, source: &S) -> Result<Constraints, TransferError>
    where
        S: ConstraintsSource + ?Sized,
    {
        match self.policy {
            NegotiationPolicy::Session => self.session(source).await,
            NegotiationPolicy::EveryUpload => fetch_validated(source).await,
        }
    }

    /// Session constraints, fetched on first use.
    pub async fn session<S>(&self, source: &S) -> Result<Constraints, TransferError>
    where
        S: ConstraintsSource + ?Sized,
    {
        self.session
            .get_or_try_init(|| fetch_validated(source))
            .await
            .copied()
    }
}

async fn fetch_validated<S>(source: &S) -> Result<Constraints, TransferError>
where
    S: ConstraintsSource + ?Sized,
{
    let constraints = source.fetch_constraints().await?;
    constraints.validate()?;
    debug!(
        max_chunk_size = constraints.max_chunk_size,
        max_file_size = constraints.max_file_size,
        "negotiated constraints"
    );
    Ok(constraints)
}
