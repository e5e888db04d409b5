//! Named read/write attributes exposed to consoles and status surfaces.
//!
//! The names and value formats follow the sysfs layout of the original Linux
//! driver (`/sys/kernel/dht22/<name>`), so scripts written against it read the
//! same text here.

use core::fmt;

pub mod grammar;

pub use grammar::{Request, SyntaxError};

use crate::TimestampMicros;
use crate::decode::Tenths;
use crate::orchestrator::{TriggerOrchestrator, TriggerRejection};

/// Every exposed attribute.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Attribute {
    GpioNumber,
    Autoupdate,
    AutoupdateTimeoutMs,
    Temperature,
    Humidity,
    Trigger,
}

/// Permitted operations on an attribute.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    ReadWrite,
    Write,
}

impl Access {
    pub const fn readable(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub const fn writable(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }

    /// `ls -l` style mode string.
    pub const fn mode(self) -> &'static str {
        match self {
            Access::Read => "r-",
            Access::ReadWrite => "rw",
            Access::Write => "-w",
        }
    }
}

/// Static description of one attribute.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AttributeSpec {
    pub attribute: Attribute,
    pub name: &'static str,
    pub access: Access,
    pub summary: &'static str,
}

/// Attribute table in listing order.
pub const ATTRIBUTES: [AttributeSpec; 6] = [
    AttributeSpec {
        attribute: Attribute::GpioNumber,
        name: "gpio_number",
        access: Access::Read,
        summary: "GPIO the sensor data line is attached to",
    },
    AttributeSpec {
        attribute: Attribute::Autoupdate,
        name: "autoupdate",
        access: Access::ReadWrite,
        summary: "1 to read periodically, 0 for on-demand reads with retry",
    },
    AttributeSpec {
        attribute: Attribute::AutoupdateTimeoutMs,
        name: "autoupdate_timeout_ms",
        access: Access::ReadWrite,
        summary: "periodic read interval in ms (2000..=600000)",
    },
    AttributeSpec {
        attribute: Attribute::Temperature,
        name: "temperature",
        access: Access::Read,
        summary: "last good temperature in degrees C",
    },
    AttributeSpec {
        attribute: Attribute::Humidity,
        name: "humidity",
        access: Access::Read,
        summary: "last good relative humidity",
    },
    AttributeSpec {
        attribute: Attribute::Trigger,
        name: "trigger",
        access: Access::Write,
        summary: "write non-zero to request a reading",
    },
];

impl Attribute {
    /// Looks up an attribute by its exact name.
    pub fn from_name(name: &str) -> Option<Self> {
        ATTRIBUTES
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.attribute)
    }

    pub fn spec(self) -> &'static AttributeSpec {
        // Every variant has exactly one table row.
        match self {
            Attribute::GpioNumber => &ATTRIBUTES[0],
            Attribute::Autoupdate => &ATTRIBUTES[1],
            Attribute::AutoupdateTimeoutMs => &ATTRIBUTES[2],
            Attribute::Temperature => &ATTRIBUTES[3],
            Attribute::Humidity => &ATTRIBUTES[4],
            Attribute::Trigger => &ATTRIBUTES[5],
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn access(self) -> Access {
        self.spec().access
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Attribute value rendered in the driver's text format.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttributeValue {
    Integer(u32),
    Flag(bool),
    Celsius(Tenths),
    Percent(Tenths),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(value) => write!(f, "{value}"),
            AttributeValue::Flag(value) => write!(f, "{}", u8::from(*value)),
            AttributeValue::Celsius(value) => write!(f, "{value}"),
            AttributeValue::Percent(value) => write!(f, "{value}%"),
        }
    }
}

/// Failures surfaced by attribute requests.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttributeError {
    Syntax(SyntaxError),
    UnknownAttribute,
    NotReadable(Attribute),
    NotWritable(Attribute),
    TriggerRejected(TriggerRejection),
}

impl fmt::Display for AttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeError::Syntax(err) => write!(f, "{err}"),
            AttributeError::UnknownAttribute => f.write_str("unknown attribute"),
            AttributeError::NotReadable(attr) => write!(f, "{attr} is write-only"),
            AttributeError::NotWritable(attr) => write!(f, "{attr} is read-only"),
            AttributeError::TriggerRejected(reason) => write!(f, "trigger rejected: {reason}"),
        }
    }
}

impl From<SyntaxError> for AttributeError {
    fn from(value: SyntaxError) -> Self {
        AttributeError::Syntax(value)
    }
}

impl From<TriggerRejection> for AttributeError {
    fn from(value: TriggerRejection) -> Self {
        AttributeError::TriggerRejected(value)
    }
}

/// Successful result of [`execute`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// Value read from an attribute.
    Value(Attribute, AttributeValue),
    /// Value in effect after a write.
    Stored(Attribute, AttributeValue),
    /// The caller should print [`ATTRIBUTES`].
    Listing,
}

/// Reads an attribute. Readings report `0.0` until the first good decode.
pub fn read(
    orchestrator: &TriggerOrchestrator,
    attribute: Attribute,
) -> Result<AttributeValue, AttributeError> {
    let timing = orchestrator.config().timing;
    let reading = orchestrator.last_reading();
    match attribute {
        Attribute::GpioNumber => Ok(AttributeValue::Integer(orchestrator.config().gpio)),
        Attribute::Autoupdate => Ok(AttributeValue::Flag(timing.autoupdate())),
        Attribute::AutoupdateTimeoutMs => Ok(AttributeValue::Integer(timing.interval_ms())),
        Attribute::Temperature => Ok(AttributeValue::Celsius(
            reading.map_or(Tenths(0), |r| r.temperature()),
        )),
        Attribute::Humidity => Ok(AttributeValue::Percent(
            reading.map_or(Tenths(0), |r| r.humidity()),
        )),
        Attribute::Trigger => Err(AttributeError::NotReadable(attribute)),
    }
}

/// Writes an attribute and returns the value now in effect.
///
/// `autoupdate` and `trigger` treat any non-zero value as true. Intervals are
/// clamped, so negative values land on the minimum.
pub fn write(
    orchestrator: &mut TriggerOrchestrator,
    attribute: Attribute,
    value: i64,
    now: TimestampMicros,
) -> Result<AttributeValue, AttributeError> {
    match attribute {
        Attribute::Autoupdate => {
            orchestrator.set_autoupdate(value != 0, now);
            Ok(AttributeValue::Flag(value != 0))
        }
        Attribute::AutoupdateTimeoutMs => {
            let requested = u32::try_from(value.max(0)).unwrap_or(u32::MAX);
            Ok(AttributeValue::Integer(
                orchestrator.set_interval_ms(requested, now),
            ))
        }
        Attribute::Trigger => {
            if value != 0 {
                orchestrator.manual_trigger(now)?;
            }
            Ok(AttributeValue::Flag(value != 0))
        }
        Attribute::GpioNumber | Attribute::Temperature | Attribute::Humidity => {
            Err(AttributeError::NotWritable(attribute))
        }
    }
}

/// Parses and executes one console line.
pub fn execute(
    orchestrator: &mut TriggerOrchestrator,
    line: &str,
    now: TimestampMicros,
) -> Result<Response, AttributeError> {
    match grammar::parse(line)? {
        Request::List => Ok(Response::Listing),
        Request::Get(name) => {
            let attribute = Attribute::from_name(name).ok_or(AttributeError::UnknownAttribute)?;
            read(orchestrator, attribute).map(|value| Response::Value(attribute, value))
        }
        Request::Set(name, value) => {
            let attribute = Attribute::from_name(name).ok_or(AttributeError::UnknownAttribute)?;
            write(orchestrator, attribute, value, now)
                .map(|stored| Response::Stored(attribute, stored))
        }
    }
}
