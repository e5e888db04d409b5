use std::fmt;

use dht22_core::TimestampMicros;
use dht22_core::attributes::{self, ATTRIBUTES, AttributeError, Response};
use dht22_core::config::SensorConfig;
use dht22_core::decode::Tenths;
use dht22_core::orchestrator::{TriggerOrchestrator, WorkReport};
use dht22_core::protocol::trigger::trigger_pulse_duration;
use dht22_core::protocol::{DataLine, MAX_RETRY_ATTEMPTS};
use dht22_core::telemetry::{EventId, Severity};

use crate::device::{EmulatedLine, FaultMode, SimulatedSensor, VirtualDelay};

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("get", "get <attribute>               - read an attribute"),
    ("set", "set <attribute> <integer>     - write an attribute"),
    ("list", "list                          - show every attribute"),
    (
        "advance",
        "advance <ms>                  - let virtual time pass",
    ),
    (
        "fault",
        "fault <kind> [sticky]         - corrupt the next response (or all of them)",
    ),
    (
        "env",
        "env <temp C> <humidity %>     - change what the sensor reports, e.g. env -3.5 61.0",
    ),
    ("status", "status                        - display orchestrator state"),
    ("log", "log                           - dump the telemetry ring"),
    ("help", "help [topic]                  - show help for a command"),
    ("exit", "exit                          - shut down and quit"),
];

/// How a line of output should be presented.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tone {
    Plain,
    Warn,
    Error,
}

impl From<Severity> for Tone {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Info => Tone::Plain,
            Severity::Warn => Tone::Warn,
            Severity::Error => Tone::Error,
        }
    }
}

/// One line of emulator output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Output {
    pub tone: Tone,
    pub text: String,
}

impl Output {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Plain,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Error,
            text: text.into(),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Initial settings taken from the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionOptions {
    pub config: SensorConfig,
    pub temperature_decis: i16,
    pub humidity_decis: u16,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            config: SensorConfig::default(),
            temperature_decis: 215,
            humidity_decis: 455,
        }
    }
}

/// Single-context host driver: one virtual clock, one simulated sensor.
///
/// Deferred work runs as soon as a command returns, and timers only fire while
/// `advance` moves the clock.
pub struct Session {
    orchestrator: TriggerOrchestrator,
    sensor: SimulatedSensor,
    line: EmulatedLine,
    delay: VirtualDelay,
    clock: TimestampMicros,
    cursor: EventId,
    closed: bool,
}

impl Session {
    pub fn new(options: SessionOptions) -> Result<Self, String> {
        let mut sensor = SimulatedSensor::new(0, 0);
        sensor.set_environment(options.temperature_decis, options.humidity_decis)?;
        Ok(Self {
            orchestrator: TriggerOrchestrator::new(options.config, 0),
            sensor,
            line: EmulatedLine::new(),
            delay: VirtualDelay::default(),
            clock: 0,
            cursor: 0,
            closed: false,
        })
    }

    pub fn orchestrator(&self) -> &TriggerOrchestrator {
        &self.orchestrator
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn handle_command(&mut self, line: &str) -> Vec<Output> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        if self.closed {
            return vec![Output::error("ERR session closed")];
        }

        let mut words = trimmed.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        let mut lines = match keyword.as_str() {
            "help" => self.handle_help(args.first().copied()),
            "advance" => self.handle_advance(&args),
            "fault" => self.handle_fault(&args),
            "env" => self.handle_env(&args),
            "status" => self.describe_status(),
            "log" => self.dump_log(),
            _ => self.handle_attribute(trimmed),
        };

        self.drain_work();
        lines.extend(self.forward_telemetry());
        lines
    }

    /// Shuts the orchestrator down, lets queued work finish and releases the
    /// line.
    pub fn close(&mut self) -> Vec<Output> {
        if self.closed {
            return Vec::new();
        }
        self.orchestrator.shutdown(self.clock);
        self.drain_work();
        self.line.release();
        self.closed = true;

        let mut lines = self.forward_telemetry();
        lines.push(Output::plain(format!(
            "line released after {} transitions",
            self.line.transitions()
        )));
        lines
    }

    fn handle_help(&self, topic: Option<&str>) -> Vec<Output> {
        match topic {
            None => HELP_TOPICS
                .iter()
                .map(|(_, text)| Output::plain(*text))
                .collect(),
            Some(topic) => match HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(topic))
            {
                Some((_, text)) => vec![Output::plain(*text)],
                None => vec![Output::error(format!(
                    "ERR unknown help topic `{topic}` (topics: {})",
                    help_topic_list()
                ))],
            },
        }
    }

    fn handle_advance(&mut self, args: &[&str]) -> Vec<Output> {
        let Some(millis) = args.first().and_then(|value| value.parse::<u64>().ok()) else {
            return vec![Output::error("ERR usage: advance <ms>")];
        };
        let until = self.clock.saturating_add(millis.saturating_mul(1_000));
        self.run_until(until);
        vec![Output::plain(format!("clock {}", format_clock(self.clock)))]
    }

    fn handle_fault(&mut self, args: &[&str]) -> Vec<Output> {
        let Some(tag) = args.first() else {
            return vec![Output::error(format!(
                "ERR usage: fault <{}> [sticky]",
                FaultMode::TAGS.join("|")
            ))];
        };
        let fault = match FaultMode::from_tag(tag) {
            Ok(fault) => fault,
            Err(err) => return vec![Output::error(format!("ERR {err}"))],
        };
        let sticky = match args.get(1) {
            None => false,
            Some(word) if word.eq_ignore_ascii_case("sticky") => true,
            Some(word) => return vec![Output::error(format!("ERR unexpected `{word}`"))],
        };

        self.sensor.inject(fault, sticky);
        vec![Output::plain(describe_fault(self.sensor.fault()))]
    }

    fn handle_env(&mut self, args: &[&str]) -> Vec<Output> {
        let parsed = match args {
            [temperature, humidity] => parse_tenths(temperature)
                .and_then(|t| i16::try_from(t).ok())
                .zip(parse_tenths(humidity).and_then(|h| u16::try_from(h).ok())),
            _ => None,
        };
        let Some((temperature, humidity)) = parsed else {
            return vec![Output::error("ERR usage: env <temp C> <humidity %>")];
        };

        match self.sensor.set_environment(temperature, humidity) {
            Ok(()) => vec![Output::plain(describe_environment(self.sensor.environment()))],
            Err(err) => vec![Output::error(format!("ERR {err}"))],
        }
    }

    fn handle_attribute(&mut self, line: &str) -> Vec<Output> {
        match attributes::execute(&mut self.orchestrator, line, self.clock) {
            Ok(Response::Value(_, value)) => vec![Output::plain(value.to_string())],
            Ok(Response::Stored(attribute, value)) => {
                vec![Output::plain(format!("OK {attribute} = {value}"))]
            }
            Ok(Response::Listing) => ATTRIBUTES
                .iter()
                .map(|spec| {
                    Output::plain(format!(
                        "{:<22} {} {}",
                        spec.name,
                        spec.access.mode(),
                        spec.summary
                    ))
                })
                .collect(),
            Err(AttributeError::Syntax(err)) => {
                vec![Output::error(format!("ERR {err} (try `help`)"))]
            }
            Err(err) => vec![Output::error(format!("ERR {err}"))],
        }
    }

    fn describe_status(&self) -> Vec<Output> {
        let orchestrator = &self.orchestrator;
        let timing = orchestrator.config().timing;
        let counters = orchestrator.telemetry().counters();
        let cycle = orchestrator.cycle();

        let reading = match orchestrator.last_reading() {
            Some(reading) => format!(
                "reading {reading} at {}",
                format_clock(reading.decoded_at)
            ),
            None => "reading none".to_string(),
        };

        vec![
            Output::plain(format!(
                "clock {} phase {} cycle {} edges {}",
                format_clock(self.clock),
                orchestrator.phase().label(),
                cycle.state(),
                cycle.edges_seen()
            )),
            Output::plain(reading),
            Output::plain(format!(
                "autoupdate {} interval {}ms next-tick {} retry {}/{} next-retry {}",
                u8::from(timing.autoupdate()),
                timing.interval_ms(),
                format_deadline(orchestrator.autoupdate_deadline()),
                orchestrator.retry().attempts(),
                MAX_RETRY_ATTEMPTS,
                format_deadline(orchestrator.retry_deadline()),
            )),
            Output::plain(format!(
                "counters triggers={} readings={} checksum={} incomplete={} stalls={} retries={} exhausted={}",
                counters.triggers,
                counters.readings,
                counters.checksum_failures,
                counters.incomplete_captures,
                counters.stalls,
                counters.retries,
                counters.retry_exhaustions,
            )),
            Output::plain(format!(
                "{} {} responses={}",
                describe_environment(self.sensor.environment()),
                describe_fault(self.sensor.fault()),
                self.sensor.responses()
            )),
            Output::plain(format!(
                "line {} transitions={} driven-for={}ms",
                self.line.level().label(),
                self.line.transitions(),
                self.delay.held().as_millis()
            )),
        ]
    }

    fn dump_log(&self) -> Vec<Output> {
        self.orchestrator
            .telemetry()
            .oldest_first()
            .map(|record| Output {
                tone: record.event.severity().into(),
                text: record.to_string(),
            })
            .collect()
    }

    fn forward_telemetry(&mut self) -> Vec<Output> {
        let telemetry = self.orchestrator.telemetry();
        let lines = telemetry
            .since(self.cursor)
            .map(|record| Output {
                tone: record.event.severity().into(),
                text: format!("  {record}"),
            })
            .collect();
        self.cursor = telemetry.next_id();
        lines
    }

    fn run_until(&mut self, until: TimestampMicros) {
        loop {
            self.drain_work();
            match self.orchestrator.next_deadline() {
                Some(deadline) if deadline <= until => {
                    self.clock = self.clock.max(deadline);
                    self.orchestrator.poll_timers(self.clock);
                }
                _ => break,
            }
        }
        self.clock = self.clock.max(until);
    }

    fn drain_work(&mut self) {
        while let Some(item) = self.orchestrator.next_work() {
            let report =
                self.orchestrator
                    .run_work(item, self.clock, &mut self.line, &mut self.delay);
            if report == WorkReport::Triggered {
                self.deliver_response();
            }
        }
    }

    /// Feeds the sensor's edges for the cycle that just started.
    fn deliver_response(&mut self) {
        let requested_at = self.clock;
        let pulse = u64::try_from(trigger_pulse_duration().as_micros()).unwrap_or(u64::MAX);
        let mut settled = requested_at.saturating_add(pulse);
        for edge in self.sensor.respond(requested_at) {
            self.orchestrator.on_edge(edge);
            settled = settled.max(edge);
        }
        self.clock = settled;
    }
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_fault((fault, sticky): (FaultMode, bool)) -> String {
    if sticky {
        format!("fault {} (sticky)", fault.label())
    } else {
        format!("fault {}", fault.label())
    }
}

fn describe_environment((temperature, humidity): (i16, u16)) -> String {
    format!(
        "env {} C {}%",
        Tenths(i32::from(temperature)),
        Tenths(i32::from(humidity))
    )
}

fn format_clock(micros: TimestampMicros) -> String {
    format!("+{}.{:03}s", micros / 1_000_000, (micros / 1_000) % 1_000)
}

fn format_deadline(deadline: Option<TimestampMicros>) -> String {
    deadline.map_or_else(|| "off".to_string(), format_clock)
}

/// Parses a decimal with at most one fractional digit into tenths.
pub fn parse_tenths(text: &str) -> Option<i32> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, "0"));
    if whole.is_empty() || fraction.len() != 1 {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let magnitude = whole.parse::<i32>().ok()?.checked_mul(10)? + fraction.parse::<i32>().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
