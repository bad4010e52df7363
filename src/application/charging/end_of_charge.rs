//! End-of-charge detection policy
//!
//! Evaluated after every meter-values call on an open transaction with at
//! least two meter values and nonzero cumulative consumption. Each outcome
//! fires at most once per transaction (dedup flags on the transaction).

use crate::domain::{Consumption, LimitSource, Transaction};

/// Thresholds, fed from configuration
#[derive(Debug, Clone)]
pub struct EndOfChargePolicy {
    pub end_of_charge_enabled: bool,
    pub optimal_charge_enabled: bool,
    /// SoC percentage that triggers the optimal-charge notification
    pub optimal_charge_percent: u8,
    /// A limit at/above this per-phase amperage is not throttling the car
    pub min_amps_per_phase: f64,
}

impl Default for EndOfChargePolicy {
    fn default() -> Self {
        Self {
            end_of_charge_enabled: true,
            optimal_charge_enabled: true,
            optimal_charge_percent: 80,
            min_amps_per_phase: 6.0,
        }
    }
}

/// Which notification to emit, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeNotification {
    EndOfCharge,
    OptimalChargeReached,
}

impl EndOfChargePolicy {
    /// `recent` is the transaction's consumption tail, oldest first.
    pub fn evaluate(
        &self,
        transaction: &Transaction,
        recent: &[Consumption],
    ) -> Option<ChargeNotification> {
        if transaction.number_of_meter_values < 2
            || transaction.current_total_consumption_wh <= 0.0
        {
            return None;
        }

        if self.end_of_charge_enabled && !transaction.notified_end_of_charge {
            if transaction.current_state_of_charge >= 100 {
                return Some(ChargeNotification::EndOfCharge);
            }
            if self.three_idle_intervals(recent) && !self.limited_by_profile(recent) {
                return Some(ChargeNotification::EndOfCharge);
            }
        }

        if self.optimal_charge_enabled
            && !transaction.notified_optimal_charge
            && transaction.current_state_of_charge >= self.optimal_charge_percent
            && transaction.current_state_of_charge < 100
        {
            return Some(ChargeNotification::OptimalChargeReached);
        }

        None
    }

    fn three_idle_intervals(&self, recent: &[Consumption]) -> bool {
        recent.len() >= 3 && recent.iter().rev().take(3).all(Consumption::is_idle)
    }

    /// A charging profile holding the car below the per-phase minimum means
    /// the zero intervals are the optimizer's doing, not a full battery.
    fn limited_by_profile(&self, recent: &[Consumption]) -> bool {
        let Some(last) = recent.last() else {
            return false;
        };
        match (last.limit_source, last.limit_amps) {
            (Some(LimitSource::ChargingProfile), Some(amps)) => amps < self.min_amps_per_phase,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tx(meter_values: u32, consumption_wh: f64, soc: u8) -> Transaction {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut tx = Transaction::new(1, "tenant-1", "CS-001", 1, "TAG-001", 0.0, t0);
        tx.number_of_meter_values = meter_values;
        tx.current_total_consumption_wh = consumption_wh;
        tx.current_state_of_charge = soc;
        tx
    }

    fn interval(wh: f64) -> Consumption {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        Consumption {
            transaction_id: 1,
            charge_box_id: "CS-001".into(),
            connector_id: 1,
            started_at: t0,
            ended_at: t0 + chrono::Duration::seconds(60),
            consumption_wh: wh,
            instant_watts: wh * 60.0,
            instant_amps: 0.0,
            cumulated_consumption_wh: 1000.0,
            total_inactivity_secs: 0,
            state_of_charge: None,
            limit_source: None,
            limit_amps: None,
            pricing: None,
        }
    }

    #[test]
    fn full_battery_triggers_end_of_charge() {
        let policy = EndOfChargePolicy::default();
        let outcome = policy.evaluate(&tx(5, 2000.0, 100), &[interval(100.0)]);
        assert_eq!(outcome, Some(ChargeNotification::EndOfCharge));
    }

    #[test]
    fn three_zero_intervals_trigger_end_of_charge() {
        let policy = EndOfChargePolicy::default();
        let recent = vec![interval(500.0), interval(0.0), interval(0.0), interval(0.0)];
        let outcome = policy.evaluate(&tx(5, 2000.0, 60), &recent);
        assert_eq!(outcome, Some(ChargeNotification::EndOfCharge));
    }

    #[test]
    fn two_zero_intervals_are_not_enough() {
        let policy = EndOfChargePolicy::default();
        let recent = vec![interval(500.0), interval(0.0), interval(0.0)];
        assert_eq!(policy.evaluate(&tx(5, 2000.0, 60), &recent), None);
    }

    #[test]
    fn profile_throttling_suppresses_end_of_charge() {
        let policy = EndOfChargePolicy::default();
        let mut throttled = interval(0.0);
        throttled.limit_source = Some(LimitSource::ChargingProfile);
        throttled.limit_amps = Some(4.0);
        let recent = vec![interval(0.0), interval(0.0), throttled];
        assert_eq!(policy.evaluate(&tx(5, 2000.0, 60), &recent), None);
    }

    #[test]
    fn profile_at_full_amps_does_not_suppress() {
        let policy = EndOfChargePolicy::default();
        let mut limited = interval(0.0);
        limited.limit_source = Some(LimitSource::ChargingProfile);
        limited.limit_amps = Some(16.0);
        let recent = vec![interval(0.0), interval(0.0), limited];
        assert_eq!(
            policy.evaluate(&tx(5, 2000.0, 60), &recent),
            Some(ChargeNotification::EndOfCharge)
        );
    }

    #[test]
    fn optimal_charge_fires_once_on_threshold() {
        let policy = EndOfChargePolicy::default();
        let recent = vec![interval(500.0)];

        let mut transaction = tx(5, 2000.0, 82);
        assert_eq!(
            policy.evaluate(&transaction, &recent),
            Some(ChargeNotification::OptimalChargeReached)
        );

        transaction.notified_optimal_charge = true;
        assert_eq!(policy.evaluate(&transaction, &recent), None);
    }

    #[test]
    fn needs_two_meter_values_and_consumption() {
        let policy = EndOfChargePolicy::default();
        assert_eq!(policy.evaluate(&tx(1, 2000.0, 100), &[]), None);
        assert_eq!(policy.evaluate(&tx(5, 0.0, 100), &[]), None);
    }

    #[test]
    fn end_of_charge_dedup_flag_wins() {
        let policy = EndOfChargePolicy::default();
        let mut transaction = tx(5, 2000.0, 100);
        transaction.notified_end_of_charge = true;
        assert_eq!(policy.evaluate(&transaction, &[interval(100.0)]), None);
    }
}
