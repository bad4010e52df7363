//! Consumption builder
//!
//! Walks a batch of normalized meter values in wire order, dispatches the
//! electrical quantities onto the transaction's phase-resolved instants, and
//! derives one consumption interval per energy register reading strictly
//! after the anchor. Replaying the same batch is idempotent: the anchor only
//! advances, so an already-seen reading yields a non-positive interval and is
//! skipped.

use tracing::{debug, warn};

use crate::domain::{
    ChargingStation, Consumption, CurrentType, LimitSource, Measurand, MeterPhase,
    NormalizedMeterValue, ReadingContext, Transaction,
};

/// Result of processing one meter-value batch
#[derive(Debug, Default)]
pub struct ProcessedMeterValues {
    pub consumptions: Vec<Consumption>,
    /// `phases_used` was derived for the first time in this batch
    pub phases_detected: bool,
    /// Energy readings ignored because the end frame was already received
    pub ignored_after_end: usize,
}

/// Derives consumption intervals and keeps the transaction's running fields
/// in sync with the meter values.
pub struct ConsumptionBuilder<'a> {
    station: &'a ChargingStation,
}

impl<'a> ConsumptionBuilder<'a> {
    pub fn new(station: &'a ChargingStation) -> Self {
        Self { station }
    }

    pub fn process(
        &self,
        transaction: &mut Transaction,
        values: &[NormalizedMeterValue],
    ) -> ProcessedMeterValues {
        let mut result = ProcessedMeterValues::default();
        // End frames from an earlier batch: later samples are clock context
        // and must not feed consumption again.
        let already_ended = transaction.transaction_end_received;
        let mut power_reading_seen = false;
        let mut phase_lines: Vec<u8> = Vec::new();

        for value in values {
            if value.attribute.context == ReadingContext::TransactionEnd
                && !transaction.transaction_end_received
            {
                transaction.transaction_end_received = true;
                transaction.reset_instant_values();
            }

            if value.is_signed_data() {
                self.capture_signed_data(transaction, value);
                continue;
            }

            if let Some(phase) = value.attribute.phase {
                if let Some(line) = phase.line() {
                    let positive = value.base_value().map_or(false, |v| v > 0.0);
                    if positive && !phase_lines.contains(&line) {
                        phase_lines.push(line);
                    }
                }
            }

            match &value.attribute.measurand {
                Measurand::StateOfCharge => self.apply_soc(transaction, value),
                Measurand::Voltage => self.apply_voltage(transaction, value),
                Measurand::PowerActiveImport => {
                    if value.attribute.phase.is_none() {
                        power_reading_seen = true;
                    }
                    self.apply_power(transaction, value);
                }
                Measurand::CurrentImport => self.apply_current(transaction, value),
                Measurand::EnergyActiveImportRegister => {
                    if already_ended {
                        result.ignored_after_end += 1;
                        debug!(
                            transaction_id = transaction.id,
                            "Ignored clock value after transaction end"
                        );
                        continue;
                    }
                    transaction.number_of_meter_values += 1;
                    if let Some(consumption) =
                        self.derive_interval(transaction, value, power_reading_seen)
                    {
                        result.consumptions.push(consumption);
                    }
                }
                Measurand::Other(name) => {
                    debug!(
                        transaction_id = transaction.id,
                        measurand = name.as_str(),
                        "Unhandled measurand"
                    );
                }
            }
        }

        if transaction.phases_used.is_none() && !phase_lines.is_empty() {
            transaction.phases_used = Some(phase_lines.len() as u8);
            result.phases_detected = true;
        }

        result
    }

    fn capture_signed_data(&self, transaction: &mut Transaction, value: &NormalizedMeterValue) {
        let payload = match &value.value {
            crate::domain::MeterReading::Signed(s) => s.clone(),
            crate::domain::MeterReading::Numeric(n) => n.to_string(),
        };
        match value.attribute.context {
            ReadingContext::TransactionBegin => transaction.signed_data = Some(payload),
            ReadingContext::TransactionEnd => transaction.current_signed_data = Some(payload),
            _ => {
                warn!(
                    transaction_id = transaction.id,
                    context = value.attribute.context.as_str(),
                    "Signed data outside Transaction.Begin/End ignored"
                );
            }
        }
    }

    fn apply_soc(&self, transaction: &mut Transaction, value: &NormalizedMeterValue) {
        let Some(soc) = value.base_value() else { return };
        let soc = soc.clamp(0.0, 100.0) as u8;
        match value.attribute.context {
            ReadingContext::TransactionBegin => {
                transaction.state_of_charge = soc;
                transaction.current_state_of_charge = soc;
            }
            _ => transaction.current_state_of_charge = soc,
        }
    }

    fn apply_voltage(&self, transaction: &mut Transaction, value: &NormalizedMeterValue) {
        let Some(volts) = value.base_value() else { return };
        if self.station.current_type == CurrentType::DC {
            transaction.current_instant_volts_dc = volts;
            return;
        }
        match value.attribute.phase.as_ref().and_then(MeterPhase::line) {
            Some(1) => transaction.current_instant_volts_l1 = volts,
            Some(2) => transaction.current_instant_volts_l2 = volts,
            Some(3) => transaction.current_instant_volts_l3 = volts,
            _ => transaction.current_instant_volts = volts,
        }
    }

    fn apply_power(&self, transaction: &mut Transaction, value: &NormalizedMeterValue) {
        let Some(watts) = value.base_value() else { return };
        if self.station.current_type == CurrentType::DC {
            transaction.current_instant_watts_dc = watts;
            if value.attribute.phase.is_none() {
                transaction.current_instant_watts = watts;
            }
            return;
        }
        match value.attribute.phase.as_ref().and_then(MeterPhase::line) {
            Some(1) => transaction.current_instant_watts_l1 = watts,
            Some(2) => transaction.current_instant_watts_l2 = watts,
            Some(3) => transaction.current_instant_watts_l3 = watts,
            _ => transaction.current_instant_watts = watts,
        }
    }

    fn apply_current(&self, transaction: &mut Transaction, value: &NormalizedMeterValue) {
        let Some(amps) = value.base_value() else { return };
        if self.station.current_type == CurrentType::DC {
            transaction.current_instant_amps_dc = amps;
            if value.attribute.phase.is_none() {
                transaction.current_instant_amps = amps;
            }
            return;
        }
        match value.attribute.phase.as_ref().and_then(MeterPhase::line) {
            Some(1) => transaction.current_instant_amps_l1 = amps,
            Some(2) => transaction.current_instant_amps_l2 = amps,
            Some(3) => transaction.current_instant_amps_l3 = amps,
            _ => transaction.current_instant_amps = amps,
        }
    }

    /// One interval per energy reading strictly after the anchor.
    fn derive_interval(
        &self,
        transaction: &mut Transaction,
        value: &NormalizedMeterValue,
        power_reading_seen: bool,
    ) -> Option<Consumption> {
        // Clock-context samples are persisted but never derive consumption.
        if value.attribute.context == ReadingContext::SampleClock {
            debug!(
                transaction_id = transaction.id,
                "Sample.Clock energy reading skipped from consumption"
            );
            return None;
        }

        let cumulated_wh = value.base_value()?;
        let anchor = transaction.consumption_anchor();
        let interval_secs = value
            .timestamp
            .signed_duration_since(anchor.timestamp)
            .num_seconds();
        if interval_secs <= 0 {
            debug!(
                transaction_id = transaction.id,
                interval_secs, "Backward-dated energy reading skipped"
            );
            return None;
        }

        let consumption_wh = (cumulated_wh - anchor.cumulated_wh).max(0.0);
        let instant_watts = consumption_wh * 3600.0 / interval_secs as f64;
        let instant_amps = self.watts_to_amps(transaction, instant_watts);
        let cumulated_consumption_wh = (cumulated_wh - transaction.meter_start).max(0.0);

        if consumption_wh == 0.0 {
            transaction.current_total_inactivity_secs += interval_secs;
        }

        let connector = self.station.connector(transaction.connector_id);
        let limit_amps = connector.and_then(|c| c.amperage_limit);
        let soc_seen =
            transaction.current_state_of_charge > 0 || transaction.state_of_charge > 0;

        let consumption = Consumption {
            transaction_id: transaction.id,
            charge_box_id: transaction.charge_box_id.clone(),
            connector_id: transaction.connector_id,
            started_at: anchor.timestamp,
            ended_at: value.timestamp,
            consumption_wh,
            instant_watts,
            instant_amps,
            cumulated_consumption_wh,
            total_inactivity_secs: transaction.current_total_inactivity_secs,
            state_of_charge: soc_seen.then_some(transaction.current_state_of_charge),
            limit_source: limit_amps.map(|_| LimitSource::Connector),
            limit_amps,
            pricing: None,
        };

        // Advance the anchor and refresh the running totals
        transaction.last_consumption = Some(crate::domain::LastConsumption {
            timestamp: value.timestamp,
            cumulated_wh,
        });
        transaction.current_total_consumption_wh = cumulated_consumption_wh;
        if !power_reading_seen {
            transaction.current_instant_watts = instant_watts;
        }

        Some(consumption)
    }

    fn watts_to_amps(&self, transaction: &Transaction, watts: f64) -> f64 {
        let voltage = self.station.voltage();
        let phases = match self.station.current_type {
            CurrentType::DC => 1,
            CurrentType::AC => transaction
                .phases_used
                .or_else(|| {
                    self.station
                        .connector(transaction.connector_id)
                        .and_then(|c| c.number_of_connected_phases)
                })
                .unwrap_or(1),
        };
        watts / (voltage * phases as f64)
    }
}
