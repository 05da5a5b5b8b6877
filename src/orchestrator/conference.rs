//! Conference flow: park the caller in a conference named after its own call
//! SID while the destination is dialed with AMD enabled.

use tracing::{debug, info, warn};

use super::{LegOutcome, Orchestrator, Outcome, OutboundStatus, WebhookReply};
use crate::{
    calls::{AttemptState, CallSid, CorrelationKey},
    error::{AppError, Result},
    markup::{self, StaticFragment},
    provider::OutboundCallRequest,
    registry::RegistryError,
};

impl Orchestrator {
    /// Dial the destination and park the inbound caller in its conference.
    ///
    /// A redelivered inbound webhook for a caller that already has a pending
    /// outbound leg is answered with the same park markup and no new call.
    pub async fn park_inbound(&self, inbound: CallSid, from: Option<String>) -> Result<Outcome> {
        let key = CorrelationKey::from(&inbound);
        let park = WebhookReply::Markup(markup::join_conference(inbound.as_str())?);

        if self.registry.contains(&key) {
            debug!(call_sid = %inbound, "Inbound webhook redelivered, re-parking");
            return Ok(Outcome::new(AttemptState::Parked, park));
        }

        let destination = self.settings.destination_number().ok_or_else(|| {
            AppError::Configuration("No destination number configured".to_string())
        })?;
        // Without a configured caller id the caller's own number is presented,
        // which the provider account has to allow.
        let caller_id = self
            .settings
            .caller_id()
            .or(from)
            .ok_or_else(|| AppError::malformed("Missing From"))?;
        let callback = self.urls.conference_outbound(&inbound)?;

        let outbound = self
            .control
            .create_call(&OutboundCallRequest {
                to: destination,
                from: caller_id,
                url: callback.clone(),
                status_callback: callback,
                machine_detection: true,
            })
            .await?;

        info!(inbound_sid = %inbound, outbound_sid = %outbound, "Placed outbound call");

        if let Err(RegistryError::DuplicateKey(_)) = self.registry.register(key.clone(), outbound.clone()) {
            warn!(
                inbound_sid = %inbound,
                outbound_sid = %outbound,
                "Concurrent inbound delivery already dialed, cancelling duplicate"
            );
            self.cancel_orphan(&outbound).await;
            return Ok(Outcome::new(AttemptState::Parked, park));
        }

        self.track(&key, Some(&outbound), AttemptState::Parked);
        Ok(Outcome::new(AttemptState::Parked, park))
    }

    /// Act on a status callback for the outbound leg of a parked caller.
    pub async fn handle_outbound_status(
        &self,
        inbound: CallSid,
        event: OutboundStatus,
    ) -> Result<Outcome> {
        let key = CorrelationKey::from(&inbound);
        let Some(status) = event.status else {
            warn!(inbound_sid = %inbound, "Outbound callback with unknown status");
            return Ok(Outcome::acknowledged(AttemptState::Acknowledged));
        };

        debug!(
            inbound_sid = %inbound,
            outbound_sid = event.call_sid.as_ref().map(|s| s.as_str()).unwrap_or("-"),
            status = %status,
            answered_by = ?event.answered_by,
            "Outbound status callback"
        );

        let outcome = LegOutcome::classify(status, event.answered_by);
        if outcome == LegOutcome::Progress {
            self.track(&key, event.call_sid.as_ref(), AttemptState::OutboundRinging);
            return Ok(Outcome::acknowledged(AttemptState::OutboundRinging));
        }

        let Some(outbound) = self.claim(&key, event.call_sid.as_ref()) else {
            debug!(inbound_sid = %inbound, status = %status, "Outbound callback already handled or from another leg");
            return Ok(Outcome::acknowledged(AttemptState::AlreadyHandled));
        };

        let result = match outcome {
            LegOutcome::Machine => {
                self.redirect_to(&inbound, StaticFragment::NotAvailable).await;
                Outcome::new(
                    AttemptState::RejectedMachine,
                    WebhookReply::Markup(markup::hangup()?),
                )
            }
            LegOutcome::Answered => {
                if self.control.conference_is_active(inbound.as_str()).await {
                    Outcome::new(
                        AttemptState::Joined,
                        WebhookReply::Markup(markup::join_conference(inbound.as_str())?),
                    )
                } else {
                    info!(inbound_sid = %inbound, "Caller left before the answer, hanging up");
                    Outcome::new(
                        AttemptState::Abandoned,
                        WebhookReply::Markup(markup::hangup()?),
                    )
                }
            }
            LegOutcome::Unreachable(_) | LegOutcome::Ended(_) => {
                self.redirect_to(&inbound, StaticFragment::NotAvailable).await;
                Outcome::acknowledged(AttemptState::Unavailable)
            }
            LegOutcome::Progress => Outcome::acknowledged(AttemptState::OutboundRinging),
        };

        self.track(&key, Some(&outbound), result.state);
        Ok(result)
    }

    /// The parked caller hung up. Cancel the outbound leg if it is still pending.
    pub async fn handle_inbound_ended(&self, inbound: CallSid) -> Result<Outcome> {
        let key = CorrelationKey::from(&inbound);
        match self.registry.try_remove(&key) {
            Some(outbound) => {
                info!(inbound_sid = %inbound, outbound_sid = %outbound, "Caller hung up, cancelling outbound call");
                self.cancel_orphan(&outbound).await;
                self.track(&key, Some(&outbound), AttemptState::Cancelled);
                Ok(Outcome::acknowledged(AttemptState::Cancelled))
            }
            None => {
                debug!(inbound_sid = %inbound, "Inbound ended with nothing pending");
                Ok(Outcome::acknowledged(AttemptState::AlreadyHandled))
            }
        }
    }
}
