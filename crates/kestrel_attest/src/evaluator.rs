use std::sync::Arc;

use kestrel_primitives::{
    Clock, Event, EventSink, IntegrityTier, NoopSink, Outcome, Platform, ReasonCode, SystemClock, TrustVerdict,
};
use tracing::{info, warn};

use crate::attester::{AttestationInput, Attester};
use crate::audit::{AttestationRecord, AuditSink};
use crate::error::AttestError;

/// Dispatches attestations to the verifier for their platform.
///
/// Every verdict is written to the audit sink and every outcome, errors
/// included, is reported to the event sink.
pub struct TrustEvaluator {
    attesters: Vec<Arc<dyn Attester>>,
    audit: Arc<dyn AuditSink>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl TrustEvaluator {
    #[must_use]
    pub fn new(attesters: Vec<Arc<dyn Attester>>, audit: Arc<dyn AuditSink>) -> Self {
        Self { attesters, audit, events: Arc::new(NoopSink), clock: Arc::new(SystemClock) }
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn attester_for(&self, platform: &str) -> Option<&Arc<dyn Attester>> {
        let platform: Platform = platform.parse().ok()?;
        self.attesters.iter().find(|a| a.platform() == platform)
    }

    pub async fn evaluate(
        &self,
        platform: &str,
        token: &str,
        device_id: &str,
        key_id: Option<&str>,
    ) -> Result<TrustVerdict, AttestError> {
        let input = AttestationInput { platform, token, device_id, key_id };
        let now = self.clock.now_millis();

        let result = match self.attester_for(platform) {
            Some(attester) => attester.attest(&input, now).await,
            None => Ok(TrustVerdict::invalid(
                platform,
                device_id,
                IntegrityTier::Unknown,
                ReasonCode::UnsupportedPlatform,
                now / 1_000,
            )),
        };

        match &result {
            Ok(verdict) => {
                info!(
                    platform,
                    device_id,
                    valid = verdict.is_valid,
                    tier = %verdict.tier,
                    reason = verdict.reason.map(ReasonCode::as_str),
                    "attestation evaluated"
                );
                self.events.emit(Event::Attestation {
                    platform: platform.to_owned(),
                    outcome: if verdict.is_valid { Outcome::Valid } else { Outcome::Invalid },
                    reason: verdict.reason.map(ReasonCode::as_str),
                });
                if let Err(err) = self.audit.record(AttestationRecord::from_verdict(verdict, token)).await {
                    warn!(device_id, error = %err, "attestation audit write failed");
                }
            }
            Err(err) => {
                warn!(platform, device_id, error = %err, "attestation verification failed");
                self.events.emit(Event::Attestation {
                    platform: platform.to_owned(),
                    outcome: Outcome::Error,
                    reason: Some(err.reason_code()),
                });
            }
        }
        result
    }
}
