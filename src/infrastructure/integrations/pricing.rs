//! Flat €/kWh pricing
//!
//! The simplest pricing integration: every consumption interval is priced at
//! a fixed rate per kWh; the cumulated amount rolls up on the transaction.

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::application::ports::{PricingPort, SessionAction};
use crate::domain::{Consumption, DomainResult, PricingSnapshot, Transaction};

pub struct SimpleTariffPricing {
    pub price_per_kwh: Decimal,
    pub currency_code: String,
}

impl SimpleTariffPricing {
    pub fn new(price_per_kwh: Decimal, currency_code: impl Into<String>) -> Self {
        Self {
            price_per_kwh,
            currency_code: currency_code.into(),
        }
    }
}

#[async_trait]
impl PricingPort for SimpleTariffPricing {
    async fn price(
        &self,
        _action: SessionAction,
        transaction: &mut Transaction,
        consumption: &mut Consumption,
    ) -> DomainResult<()> {
        let kwh = Decimal::from_f64(consumption.consumption_wh).unwrap_or_default()
            / Decimal::from(1000);
        let cumulated_kwh =
            Decimal::from_f64(consumption.cumulated_consumption_wh).unwrap_or_default()
                / Decimal::from(1000);

        let amount = kwh * self.price_per_kwh;
        let cumulated_amount = cumulated_kwh * self.price_per_kwh;

        consumption.pricing = Some(PricingSnapshot {
            amount,
            rounded_amount: amount.round_dp(2),
            cumulated_amount,
            currency_code: self.currency_code.clone(),
            source: "simple".to_string(),
        });
        transaction.current_cumulated_price = Some(cumulated_amount);
        Ok(())
    }
}
