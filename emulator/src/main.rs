mod device;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use crossterm::style::Stylize;
use dht22_core::config::{DEFAULT_GPIO, DEFAULT_INTERVAL_MS, SensorConfig, TimingConfig};

use session::{Output, Session, SessionOptions, Tone, parse_tenths};

const USAGE: &str = "Usage: dht22-emulator [--gpio <n>] [--autoupdate <0|1>] [--interval-ms <ms>] \
                     [--temperature <C>] [--humidity <%>]";

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{}", err.as_str().red());
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let mut session = Session::new(options).unwrap_or_else(|err| {
        eprintln!("{}", err.as_str().red());
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "DHT22 emulator ready (gpio {}). Type `help` for commands or `exit` to quit.",
        options.config.gpio
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            break;
        }

        for output in session.handle_command(trimmed) {
            print_output(&mut writer, &output)?;
        }
    }

    for output in session.close() {
        print_output(&mut writer, &output)?;
    }
    writeln!(writer, "Session closed.")?;
    Ok(())
}

fn print_output(writer: &mut impl Write, output: &Output) -> io::Result<()> {
    match output.tone {
        Tone::Plain => writeln!(writer, "{output}"),
        Tone::Warn => writeln!(writer, "{}", output.text.as_str().yellow()),
        Tone::Error => writeln!(writer, "{}", output.text.as_str().red()),
    }
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Parses `--flag value` and `--flag=value` arguments.
fn parse_options(args: impl IntoIterator<Item = String>) -> Result<SessionOptions, String> {
    let mut options = SessionOptions::default();
    let mut gpio = DEFAULT_GPIO;
    let mut autoupdate = false;
    let mut interval_ms = DEFAULT_INTERVAL_MS;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let value = match inline {
            Some(value) => value,
            None => args
                .next()
                .ok_or_else(|| format!("Expected value after {flag}"))?,
        };

        match flag.as_str() {
            "--gpio" => gpio = parse_number(&flag, &value)?,
            "--autoupdate" => autoupdate = parse_number::<u32>(&flag, &value)? != 0,
            "--interval-ms" => interval_ms = parse_number(&flag, &value)?,
            "--temperature" => {
                options.temperature_decis = parse_tenths(&value)
                    .and_then(|tenths| i16::try_from(tenths).ok())
                    .ok_or_else(|| format!("Invalid value `{value}` for {flag}"))?;
            }
            "--humidity" => {
                options.humidity_decis = parse_tenths(&value)
                    .and_then(|tenths| u16::try_from(tenths).ok())
                    .ok_or_else(|| format!("Invalid value `{value}` for {flag}"))?;
            }
            _ => return Err(format!("Unknown argument `{flag}`")),
        }
    }

    options.config = SensorConfig::new(gpio, TimingConfig::new(interval_ms, autoupdate));
    Ok(options)
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value `{value}` for {flag}"))
}
