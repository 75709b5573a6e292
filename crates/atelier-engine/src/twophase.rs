// The two-phase confirm protocol.
//
// Every value-moving user action follows the same shape:
//
//   1. Quote: the engine validates the request against current state, builds
//      an unsigned transaction plus a price, and persists NOTHING.
//   2. The user's wallet countersigns and submits the transaction; the time
//      this takes is unbounded and outside our control.
//   3. Confirm: the engine polls the ledger for the submitted signature,
//      re-validates against the *current* on-ledger and in-store state,
//      recomputes the price from current tallies, and only then mutates.
//
// Re-deriving price and eligibility at confirm time is what keeps a stale
// quote from corrupting a tally or mis-charging a user.

use std::time::Duration;

use atelier_ledger::LedgerClient;
use serde::{Deserialize, Serialize};

use crate::error::HouseError;

/// Delay before the second (and last) confirmation check.
const RECHECK_DELAY: Duration = Duration::from_secs(2);

/// What a confirm endpoint receives: the entity being confirmed and the
/// signature of the submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedSubmission {
    pub identifier: String,
    pub signature: String,
}

/// Bounded confirmation poll: one immediate check, one delayed recheck.
/// A transaction that is still pending after that fails this confirm call;
/// the client may retry the confirm once the ledger catches up.
pub(crate) async fn await_confirmation(
    ledger: &dyn LedgerClient,
    signature: &str,
) -> Result<(), HouseError> {
    let first = ledger.poll_confirmation(signature).await?;
    if let Some(reason) = first.error {
        return Err(HouseError::LedgerRejected(reason));
    }
    if first.confirmed {
        return Ok(());
    }

    tokio::time::sleep(RECHECK_DELAY).await;

    let second = ledger.poll_confirmation(signature).await?;
    if let Some(reason) = second.error {
        return Err(HouseError::LedgerRejected(reason));
    }
    if second.confirmed {
        Ok(())
    } else {
        Err(HouseError::NotConfirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_ledger::{Confirmation, MockLedger};

    #[tokio::test]
    async fn confirmed_signature_passes() {
        let ledger = MockLedger::new();
        ledger.set_confirmation("sig", Confirmation::confirmed());
        assert!(await_confirmation(&ledger, "sig").await.is_ok());
    }

    #[tokio::test]
    async fn failed_signature_is_rejected() {
        let ledger = MockLedger::new();
        ledger.set_confirmation("sig", Confirmation::failed("reverted"));
        match await_confirmation(&ledger, "sig").await {
            Err(HouseError::LedgerRejected(reason)) => assert_eq!(reason, "reverted"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pending_signature_times_out_after_recheck() {
        let ledger = MockLedger::new();
        ledger.set_confirmation("sig", Confirmation::pending());
        let result = await_confirmation(&ledger, "sig").await;
        assert!(matches!(result, Err(HouseError::NotConfirmed)));
    }
}
