//! Normalized meter values
//!
//! Both protocol variants flatten into this shape: one row per sampled value,
//! carrying its own attribute block. Unknown measurand/context/unit strings
//! are preserved verbatim so newer firmware vocabularies survive a round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the station took this sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingContext {
    SamplePeriodic,
    SampleClock,
    TransactionBegin,
    TransactionEnd,
    InterruptionBegin,
    InterruptionEnd,
    Trigger,
    Other(String),
}

impl ReadingContext {
    pub fn parse(s: &str) -> Self {
        match s {
            "Sample.Periodic" => Self::SamplePeriodic,
            "Sample.Clock" => Self::SampleClock,
            "Transaction.Begin" => Self::TransactionBegin,
            "Transaction.End" => Self::TransactionEnd,
            "Interruption.Begin" => Self::InterruptionBegin,
            "Interruption.End" => Self::InterruptionEnd,
            "Trigger" => Self::Trigger,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SamplePeriodic => "Sample.Periodic",
            Self::SampleClock => "Sample.Clock",
            Self::TransactionBegin => "Transaction.Begin",
            Self::TransactionEnd => "Transaction.End",
            Self::InterruptionBegin => "Interruption.Begin",
            Self::InterruptionEnd => "Interruption.End",
            Self::Trigger => "Trigger",
            Self::Other(s) => s,
        }
    }
}

impl Default for ReadingContext {
    fn default() -> Self {
        Self::SamplePeriodic
    }
}

/// Encoding of the sampled value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueFormat {
    #[default]
    Raw,
    SignedData,
}

impl ValueFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "SignedData" => Self::SignedData,
            _ => Self::Raw,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "Raw",
            Self::SignedData => "SignedData",
        }
    }
}

/// What was measured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measurand {
    EnergyActiveImportRegister,
    PowerActiveImport,
    CurrentImport,
    Voltage,
    StateOfCharge,
    Other(String),
}

impl Measurand {
    pub fn parse(s: &str) -> Self {
        match s {
            "Energy.Active.Import.Register" => Self::EnergyActiveImportRegister,
            "Power.Active.Import" => Self::PowerActiveImport,
            "Current.Import" => Self::CurrentImport,
            "Voltage" => Self::Voltage,
            "SoC" => Self::StateOfCharge,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::EnergyActiveImportRegister => "Energy.Active.Import.Register",
            Self::PowerActiveImport => "Power.Active.Import",
            Self::CurrentImport => "Current.Import",
            Self::Voltage => "Voltage",
            Self::StateOfCharge => "SoC",
            Self::Other(s) => s,
        }
    }
}

impl Default for Measurand {
    fn default() -> Self {
        Self::EnergyActiveImportRegister
    }
}

/// Where on the charging chain the sample was taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterLocation {
    Body,
    Cable,
    Ev,
    Inlet,
    Outlet,
    Other(String),
}

impl MeterLocation {
    pub fn parse(s: &str) -> Self {
        match s {
            "Body" => Self::Body,
            "Cable" => Self::Cable,
            "EV" => Self::Ev,
            "Inlet" => Self::Inlet,
            "Outlet" => Self::Outlet,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Default for MeterLocation {
    fn default() -> Self {
        Self::Outlet
    }
}

/// Electrical phase annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterPhase {
    L1,
    L2,
    L3,
    N,
    L1N,
    L2N,
    L3N,
    L1L2,
    L2L3,
    L3L1,
}

impl MeterPhase {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "L1" => Some(Self::L1),
            "L2" => Some(Self::L2),
            "L3" => Some(Self::L3),
            "N" => Some(Self::N),
            "L1-N" => Some(Self::L1N),
            "L2-N" => Some(Self::L2N),
            "L3-N" => Some(Self::L3N),
            "L1-L2" => Some(Self::L1L2),
            "L2-L3" => Some(Self::L2L3),
            "L3-L1" => Some(Self::L3L1),
            _ => None,
        }
    }

    /// Collapse the -N variants onto their line for field dispatch.
    pub fn line(&self) -> Option<u8> {
        match self {
            Self::L1 | Self::L1N => Some(1),
            Self::L2 | Self::L2N => Some(2),
            Self::L3 | Self::L3N => Some(3),
            _ => None,
        }
    }
}

/// Unit of the sampled value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterUnit {
    Wh,
    KWh,
    W,
    KW,
    A,
    V,
    Percent,
    Other(String),
}

impl MeterUnit {
    pub fn parse(s: &str) -> Self {
        match s {
            "Wh" => Self::Wh,
            "kWh" => Self::KWh,
            "W" => Self::W,
            "kW" => Self::KW,
            "A" => Self::A,
            "V" => Self::V,
            "Percent" => Self::Percent,
            other => Self::Other(other.to_string()),
        }
    }

    /// Factor that brings a value in this unit to the base unit (Wh or W).
    pub fn base_factor(&self) -> f64 {
        match self {
            Self::KWh | Self::KW => 1000.0,
            _ => 1.0,
        }
    }
}

impl Default for MeterUnit {
    fn default() -> Self {
        Self::Wh
    }
}

/// Attribute block of a normalized meter value. The defaults are the OCPP
/// defaults applied when a sampled value omits its attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterValueAttributes {
    pub context: ReadingContext,
    pub format: ValueFormat,
    pub measurand: Measurand,
    pub location: MeterLocation,
    pub unit: MeterUnit,
    pub phase: Option<MeterPhase>,
}

/// The sampled value itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeterReading {
    Numeric(f64),
    /// Opaque signed-meter payload, preserved verbatim
    Signed(String),
}

impl MeterReading {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            Self::Signed(_) => None,
        }
    }
}

/// One flattened meter value row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMeterValue {
    pub connector_id: u32,
    pub transaction_id: Option<i32>,
    pub timestamp: DateTime<Utc>,
    pub attribute: MeterValueAttributes,
    pub value: MeterReading,
}

impl NormalizedMeterValue {
    pub fn is_energy(&self) -> bool {
        self.attribute.measurand == Measurand::EnergyActiveImportRegister
            && self.attribute.format == ValueFormat::Raw
    }

    pub fn is_soc(&self) -> bool {
        self.attribute.measurand == Measurand::StateOfCharge
    }

    pub fn is_signed_data(&self) -> bool {
        self.attribute.format == ValueFormat::SignedData
    }

    /// Numeric value scaled to the base unit (Wh, W, A, V, %).
    pub fn base_value(&self) -> Option<f64> {
        self.value
            .as_numeric()
            .map(|v| v * self.attribute.unit.base_factor())
    }
}
