//! Payment methods and cash settlement.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{PosError, Result};
use crate::money::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PaymentMethod {
    #[serde(rename = "EFECTIVO")]
    Cash,
    #[serde(rename = "TARJETA_DEBITO")]
    DebitCard,
    #[serde(rename = "TARJETA_CREDITO")]
    CreditCard,
    /// Unspecified card; recorded by the simulator.
    #[serde(rename = "TARJETA")]
    Card,
    #[serde(rename = "TRANSFERENCIA")]
    Transfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        Self::Cash,
        Self::DebitCard,
        Self::CreditCard,
        Self::Card,
        Self::Transfer,
    ];

    /// Code stored in `ventas.forma_pago`.
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Cash => "EFECTIVO",
            Self::DebitCard => "TARJETA_DEBITO",
            Self::CreditCard => "TARJETA_CREDITO",
            Self::Card => "TARJETA",
            Self::Transfer => "TRANSFERENCIA",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_db() == value)
    }

    /// Customer-facing label printed on tickets.
    pub fn label(self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::DebitCard => "Debit card",
            Self::CreditCard => "Credit card",
            Self::Card => "Card",
            Self::Transfer => "Bank transfer",
        }
    }

    pub fn is_cash(self) -> bool {
        matches!(self, Self::Cash)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    /// Accepts database codes and short English aliases, case-insensitively.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        if let Some(m) = Self::from_db(&norm) {
            return Ok(m);
        }
        match norm.as_str() {
            "CASH" => Ok(Self::Cash),
            "DEBIT" | "DEBIT_CARD" => Ok(Self::DebitCard),
            "CREDIT" | "CREDIT_CARD" => Ok(Self::CreditCard),
            "CARD" => Ok(Self::Card),
            "TRANSFER" => Ok(Self::Transfer),
            _ => Err(format!("unknown payment method '{s}'")),
        }
    }
}

/// Outcome of settling a sale total against the customer's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub method: PaymentMethod,
    pub received: Decimal,
    pub change: Decimal,
}

/// Settle `total` with `method`.
///
/// Cash requires `received >= total` and yields the change; a missing amount
/// means exact cash. Every other method is charged exactly the total.
pub fn settle(total: Decimal, method: PaymentMethod, received: Option<Decimal>) -> Result<Settlement> {
    let total = round_money(total);
    if !method.is_cash() {
        return Ok(Settlement {
            method,
            received: total,
            change: Decimal::ZERO,
        });
    }

    let received = round_money(received.unwrap_or(total));
    if received < total {
        return Err(PosError::InsufficientPayment { total, received });
    }
    Ok(Settlement {
        method,
        received,
        change: received - total,
    })
}
