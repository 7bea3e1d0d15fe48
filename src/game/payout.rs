//! Payout and Settlement
//!
//! Settles a stake against a realized multiplier. Every operation here reads
//! a [`RoundSnapshot`]; nothing here can change round timing or outcome.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use uuid::Uuid;

use crate::game::growth::format_multiplier;
use crate::game::state::{RoundSnapshot, RoundStatus};

/// Result of settling a stake.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    /// Amount credited to the player.
    pub user_gain: f64,
    /// Amount retained by the house. Always zero: the house edge lives only
    /// in the crash-point distribution.
    pub system_gain: f64,
    /// Gross win, `stake * multiplier`.
    pub total_win: f64,
}

/// Settle `stake` at `multiplier` with a 100% payout.
pub fn calculate_payout(stake: f64, multiplier: f64) -> Payout {
    let total_win = stake * multiplier;
    Payout {
        user_gain: total_win,
        system_gain: 0.0,
        total_win,
    }
}

/// Settlement errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementError {
    /// Stake must be a positive finite amount.
    #[error("invalid stake: {0}")]
    InvalidStake(f64),

    /// Auto cash-out target must be at least 1.00x.
    #[error("invalid auto cash-out target: {0}")]
    InvalidTarget(f64),

    /// Bet was already cashed out or lost.
    #[error("bet is no longer active")]
    BetInactive,

    /// Cash-out is only possible while a round is running.
    #[error("round is not running (status: {})", .0.as_str())]
    RoundNotRunning(RoundStatus),

    /// Bet was placed on a different round.
    #[error("bet belongs to round {bet_round}, live round is {live_round}")]
    WrongRound {
        /// Round the bet was placed on.
        bet_round: u64,
        /// Round in the snapshot.
        live_round: u64,
    },
}

/// Where a bet stands.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BetStatus {
    /// Riding the multiplier.
    Active,
    /// Locked in before the crash.
    CashedOut {
        /// Multiplier the bet was settled at.
        multiplier: f64,
        /// Settlement result.
        payout: Payout,
    },
    /// Still active when the round crashed.
    Lost,
}

/// A stake riding one round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bet {
    /// Bet identifier.
    pub id: Uuid,
    /// Round the bet rides.
    pub round_number: u64,
    /// Amount staked.
    pub stake: f64,
    /// Fixed target to cash out at automatically.
    pub auto_cashout: Option<f64>,
    /// Current status.
    pub status: BetStatus,
}

impl Bet {
    /// Create an active bet on `round_number`.
    pub fn new(
        round_number: u64,
        stake: f64,
        auto_cashout: Option<f64>,
    ) -> Result<Self, SettlementError> {
        if !stake.is_finite() || stake <= 0.0 {
            return Err(SettlementError::InvalidStake(stake));
        }
        if let Some(target) = auto_cashout {
            if !target.is_finite() || target < 1.0 {
                return Err(SettlementError::InvalidTarget(target));
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            round_number,
            stake,
            auto_cashout,
            status: BetStatus::Active,
        })
    }

    /// Is the bet still riding?
    pub fn is_active(&self) -> bool {
        matches!(self.status, BetStatus::Active)
    }

    /// Multiplier the bet was cashed out at, if any.
    pub fn cashout_multiplier(&self) -> Option<f64> {
        match self.status {
            BetStatus::CashedOut { multiplier, .. } => Some(multiplier),
            _ => None,
        }
    }

    /// Cash out at the live multiplier.
    pub fn cash_out(&mut self, snapshot: &RoundSnapshot) -> Result<Payout, SettlementError> {
        self.check_live(snapshot)?;
        Ok(self.settle_at(snapshot.multiplier))
    }

    /// Cash out at the auto target once the live multiplier has crossed it.
    ///
    /// Returns `None` while the target has not been reached, the bet has no
    /// target, or the round is not running.
    pub fn check_auto_cashout(&mut self, snapshot: &RoundSnapshot) -> Option<Payout> {
        let target = self.auto_cashout?;
        if self.check_live(snapshot).is_err() || snapshot.multiplier < target {
            return None;
        }
        Some(self.settle_at(target))
    }

    /// Mark the bet lost if it is still active. Returns whether it changed.
    pub fn settle_crash(&mut self) -> bool {
        if self.is_active() {
            self.status = BetStatus::Lost;
            true
        } else {
            false
        }
    }

    fn check_live(&self, snapshot: &RoundSnapshot) -> Result<(), SettlementError> {
        if !self.is_active() {
            return Err(SettlementError::BetInactive);
        }
        if snapshot.status != RoundStatus::Running {
            return Err(SettlementError::RoundNotRunning(snapshot.status));
        }
        if snapshot.round_number != self.round_number {
            return Err(SettlementError::WrongRound {
                bet_round: self.round_number,
                live_round: snapshot.round_number,
            });
        }
        Ok(())
    }

    fn settle_at(&mut self, multiplier: f64) -> Payout {
        let payout = calculate_payout(self.stake, multiplier);
        tracing::debug!(
            bet = %self.id,
            at = %format_multiplier(multiplier),
            win = payout.total_win,
            "bet cashed out"
        );
        self.status = BetStatus::CashedOut { multiplier, payout };
        payout
    }
}

/// Mark every still-active bet lost. No grace window.
///
/// Returns how many bets were lost.
pub fn settle_crash(bets: &mut [Bet]) -> usize {
    bets.iter_mut().map(Bet::settle_crash).filter(|lost| *lost).count()
}
