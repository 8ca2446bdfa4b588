//! Deposit settlement: debt, one-off charges and late fees against a tenancy deposit.

use crate::error::{Error, Result};
use crate::money::{self, checked_add, is_negligible, settle_amount};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

/// Obligation category. Debt kinds count toward `total_debt`; the rest are one-off charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationKind {
    UnpaidRent,
    UnpaidUtilities,
    Cleaning,
    Damage,
    Other,
}

impl ObligationKind {
    pub fn is_debt(&self) -> bool {
        matches!(self, ObligationKind::UnpaidRent | ObligationKind::UnpaidUtilities)
    }
}

/// A non-metered amount owed by the tenant.
///
/// Only confirmed obligations bind against the deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    pub id: String,
    pub kind: ObligationKind,
    pub amount: Decimal,
    pub confirmed: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl Obligation {
    pub fn confirmed(id: &str, kind: ObligationKind, amount: Decimal) -> Self {
        Obligation {
            id: id.to_string(),
            kind,
            amount,
            confirmed: true,
            description: None,
        }
    }

    pub fn unconfirmed(id: &str, kind: ObligationKind, amount: Decimal) -> Self {
        Obligation {
            confirmed: false,
            ..Obligation::confirmed(id, kind, amount)
        }
    }
}

/// Move-out dates for a tenancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutRecord {
    pub notice_date: NaiveDate,
    #[serde(default)]
    pub planned_date: Option<NaiveDate>,
    #[serde(default)]
    pub actual_date: Option<NaiveDate>,
}

impl MoveOutRecord {
    /// Whole days past the planned date, measured to the actual date or `today`.
    pub fn late_days(&self, today: NaiveDate) -> u32 {
        let Some(planned) = self.planned_date else {
            return 0;
        };
        let end = self.actual_date.unwrap_or(today);
        let days = (end - planned).num_days().max(0);
        u32::try_from(days).unwrap_or(u32::MAX)
    }
}

/// Whether debt may be deducted from the deposit instead of invoiced separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPolicy {
    pub allow_debt_offset: bool,
}

/// Landlord action on an accrued late fee. Nothing is deducted until it is `Applied`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateFeeStatus {
    #[default]
    Unresolved,
    Applied,
    Waived,
}

/// Engine-wide settlement parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Late fee per day past the planned move-out date. No default: must be configured.
    pub daily_late_rate: Option<Decimal>,
}

impl SettlementConfig {
    pub fn with_daily_late_rate(rate: Decimal) -> Self {
        SettlementConfig {
            daily_late_rate: Some(rate),
        }
    }
}

/// Final outcome of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Refund,
    Invoice,
    Blocked,
}

/// Condition preventing a settlement from being finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BlockingReason {
    PolicyForbidsDebtOffset { debt: Decimal },
    RequiredMetersUnresolved { meters: Vec<String> },
    UnresolvedLateFee { amount: Decimal },
    UnconfirmedObligation { id: String, amount: Decimal },
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingReason::PolicyForbidsDebtOffset { debt } => write!(
                f,
                "policy forbids debt offset (outstanding debt {})",
                money::format_amount(*debt)
            ),
            BlockingReason::RequiredMetersUnresolved { meters } if meters.is_empty() => {
                f.write_str("required meters unresolved")
            }
            BlockingReason::RequiredMetersUnresolved { meters } => {
                write!(f, "required meters unresolved: {}", meters.join(", "))
            }
            BlockingReason::UnresolvedLateFee { amount } => write!(
                f,
                "late fee {} must be applied or waived",
                money::format_amount(*amount)
            ),
            BlockingReason::UnconfirmedObligation { id, amount } => write!(
                f,
                "obligation {} ({}) is not confirmed",
                id,
                money::format_amount(*amount)
            ),
        }
    }
}

/// Everything the calculator needs about one tenancy, already fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub deposit: Decimal,
    #[serde(default)]
    pub obligations: Vec<Obligation>,
    #[serde(default)]
    pub move_out: Option<MoveOutRecord>,
    /// Unpaid metered utility charges, counted as debt
    #[serde(default)]
    pub utility_debt: Decimal,
    #[serde(default)]
    pub late_fee_status: LateFeeStatus,
    /// Required meters not yet approved, by name
    #[serde(default)]
    pub unresolved_meters: Vec<String>,
}

impl SettlementRequest {
    pub fn new(deposit: Decimal) -> Self {
        SettlementRequest {
            deposit,
            ..Default::default()
        }
    }
}

/// Derived settlement outcome. Amounts are rounded to cents.
///
/// `refundable_amount` is `None` only when the orchestrator refused to compute it
/// because readings are still outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub deposit: Decimal,
    pub total_debt: Decimal,
    pub confirmed_charges: Decimal,
    pub late_days: u32,
    pub late_fee: Decimal,
    pub late_fee_status: LateFeeStatus,
    /// Negative means the tenant owes more than the deposit covers
    pub refundable_amount: Option<Decimal>,
    /// Amount to invoice separately
    pub additional_due: Decimal,
    pub blocking_reasons: Vec<BlockingReason>,
    pub decision: Decision,
}

impl SettlementResult {
    /// Blocked result with no numbers, for settlements that cannot be evaluated yet.
    pub fn blocked(deposit: Decimal, reason: BlockingReason) -> Self {
        SettlementResult {
            deposit: settle_amount(deposit),
            total_debt: Decimal::ZERO,
            confirmed_charges: Decimal::ZERO,
            late_days: 0,
            late_fee: Decimal::ZERO,
            late_fee_status: LateFeeStatus::Unresolved,
            refundable_amount: None,
            additional_due: Decimal::ZERO,
            blocking_reasons: vec![reason],
            decision: Decision::Blocked,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.decision == Decision::Blocked
    }

    /// Human-readable blocking reasons, in order.
    pub fn reason_messages(&self) -> Vec<String> {
        self.blocking_reasons.iter().map(|r| r.to_string()).collect()
    }
}

/// Late fee accrued by `move_out` as of `today`: `(late_days, fee)`.
///
/// Fails when the tenant is late and no daily rate is configured.
pub fn late_fee(
    move_out: Option<&MoveOutRecord>,
    today: NaiveDate,
    config: &SettlementConfig,
) -> Result<(u32, Decimal)> {
    let days = move_out.map(|m| m.late_days(today)).unwrap_or(0);
    if days == 0 {
        return Ok((0, Decimal::ZERO));
    }
    let rate = config
        .daily_late_rate
        .ok_or(Error::MissingConfig("daily_late_rate"))?;
    if rate.is_sign_negative() && !rate.is_zero() {
        return Err(Error::InvalidInput(format!("Negative daily late rate {}", rate)));
    }
    let fee = money::checked_mul(Decimal::from(days), rate, "late fee")?;
    Ok((days, settle_amount(fee)))
}

/// Decide a deposit refund.
///
/// Blocking reasons are collected in a fixed order (policy, meters, late fee, unconfirmed
/// obligations) so identical inputs always produce identical results.
pub fn settle(
    request: &SettlementRequest,
    policy: &DepositPolicy,
    config: &SettlementConfig,
    today: NaiveDate,
) -> Result<SettlementResult> {
    validate_request(request)?;

    let mut seen = HashSet::new();
    let mut debt = request.utility_debt;
    let mut charges = Decimal::ZERO;
    let mut unconfirmed = Vec::new();

    for ob in &request.obligations {
        if !seen.insert(ob.id.as_str()) {
            warn!(obligation = %ob.id, "duplicate obligation ignored");
            continue;
        }
        if !ob.confirmed {
            if !is_negligible(ob.amount) {
                unconfirmed.push(BlockingReason::UnconfirmedObligation {
                    id: ob.id.clone(),
                    amount: settle_amount(ob.amount),
                });
            }
            continue;
        }
        if ob.kind.is_debt() {
            debt = checked_add(debt, ob.amount, "debt")?;
        } else {
            charges = checked_add(charges, ob.amount, "charges")?;
        }
    }

    let total_debt = settle_amount(debt);
    let confirmed_charges = settle_amount(charges);
    let (late_days, late_fee) = late_fee(request.move_out.as_ref(), today, config)?;
    let applied_late_fee = match request.late_fee_status {
        LateFeeStatus::Applied => late_fee,
        LateFeeStatus::Unresolved | LateFeeStatus::Waived => Decimal::ZERO,
    };
    let deductions = checked_add(debt, charges, "deductions")?;
    let deductions = checked_add(deductions, applied_late_fee, "deductions")?;

    let mut reasons = Vec::new();
    if !policy.allow_debt_offset && total_debt > Decimal::ZERO {
        reasons.push(BlockingReason::PolicyForbidsDebtOffset { debt: total_debt });
    }
    if !request.unresolved_meters.is_empty() {
        reasons.push(BlockingReason::RequiredMetersUnresolved {
            meters: request.unresolved_meters.clone(),
        });
    }
    if late_fee > Decimal::ZERO && request.late_fee_status == LateFeeStatus::Unresolved {
        reasons.push(BlockingReason::UnresolvedLateFee { amount: late_fee });
    }
    reasons.extend(unconfirmed);

    let (refundable, additional_due) = if policy.allow_debt_offset {
        let refundable = settle_amount(money::checked_sub(request.deposit, deductions, "refund")?);
        let due = if refundable < Decimal::ZERO {
            -refundable
        } else {
            Decimal::ZERO
        };
        (refundable, due)
    } else {
        (settle_amount(request.deposit), settle_amount(deductions))
    };

    let decision = if !reasons.is_empty() {
        Decision::Blocked
    } else if refundable >= Decimal::ZERO {
        Decision::Refund
    } else {
        Decision::Invoice
    };

    info!(
        deposit = %request.deposit,
        total_debt = %total_debt,
        charges = %confirmed_charges,
        late_days,
        refundable = %refundable,
        ?decision,
        "deposit settled"
    );

    Ok(SettlementResult {
        deposit: settle_amount(request.deposit),
        total_debt,
        confirmed_charges,
        late_days,
        late_fee,
        late_fee_status: request.late_fee_status,
        refundable_amount: Some(refundable),
        additional_due,
        blocking_reasons: reasons,
        decision,
    })
}

fn validate_request(request: &SettlementRequest) -> Result<()> {
    if request.deposit.is_sign_negative() && !request.deposit.is_zero() {
        return Err(Error::InvalidInput(format!(
            "Negative deposit {}",
            request.deposit
        )));
    }
    if request.utility_debt.is_sign_negative() && !request.utility_debt.is_zero() {
        return Err(Error::InvalidInput(format!(
            "Negative utility debt {}",
            request.utility_debt
        )));
    }
    if let Some(ob) = request
        .obligations
        .iter()
        .find(|o| o.amount.is_sign_negative() && !o.amount.is_zero())
    {
        return Err(Error::InvalidInput(format!(
            "Obligation {} has negative amount {}",
            ob.id, ob.amount
        )));
    }
    Ok(())
}
