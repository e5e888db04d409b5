use dht22_core::orchestrator::{TriggerOrchestrator, WorkItem};
use dht22_core::protocol::run_trigger_pulse;

use super::{TIMERS_CHANGED, WORK_READY};
use crate::sensor::{self, BusyWaitDelay, HardwareLine, SharedSensor, with_sensor};

/// Deferred-work context: drives the request pulse, decodes and cleans up.
#[embassy_executor::task]
pub async fn run(mut line: HardwareLine<'static>, sensor: &'static SharedSensor) -> ! {
    let mut delay = BusyWaitDelay;
    loop {
        // A trigger is started in the same critical section that pops it, so
        // no edge can change the cycle state in between.
        let next = with_sensor(sensor, |orchestrator| {
            let item = orchestrator.next_work()?;
            let started = (item == WorkItem::Trigger)
                .then(|| orchestrator.begin_trigger(sensor::now()));
            Some((item, started))
        });
        let Some((item, started)) = next else {
            WORK_READY.wait().await;
            continue;
        };

        match item {
            WorkItem::Trigger => {
                if let Some(Err(reason)) = started {
                    defmt::debug!("worker: trigger skipped ({})", defmt::Display2Format(&reason));
                    continue;
                }
                // The edge task must be able to take the lock while the pulse
                // is driven, so the pulse runs outside it.
                run_trigger_pulse(&mut line, &mut delay);
                with_sensor(sensor, |orchestrator| orchestrator.end_trigger(sensor::now()));
                TIMERS_CHANGED.signal(());
            }
            WorkItem::Decode => {
                let result = with_sensor(sensor, |orchestrator| {
                    orchestrator.process_capture(sensor::now())
                });
                if let Ok(reading) = result {
                    defmt::info!("dht22: {}", defmt::Display2Format(&reading));
                }
                TIMERS_CHANGED.signal(());
            }
            WorkItem::Cleanup => with_sensor(sensor, TriggerOrchestrator::cleanup),
        }
    }
}
