use embassy_time::{Duration, Ticker};

use crate::sensor::{SharedSensor, with_sensor};
use crate::status;
use crate::telemetry::{TelemetryForwarder, emit_batch};

const REPORT_PERIOD: Duration = Duration::from_millis(250);

/// Publishes status atomics and forwards new telemetry to the log.
///
/// Ticks that land during a capture are skipped so the critical section
/// never delays the edge task.
#[embassy_executor::task]
pub async fn run(sensor: &'static SharedSensor) -> ! {
    let mut forwarder = TelemetryForwarder::new();
    let mut ticker = Ticker::every(REPORT_PERIOD);
    loop {
        ticker.next().await;
        let batch = with_sensor(sensor, |orchestrator| {
            let batch = forwarder.collect_when_quiet(orchestrator)?;
            status::publish(orchestrator);
            Some(batch)
        });
        if let Some(batch) = batch {
            emit_batch(&batch);
        }
    }
}
