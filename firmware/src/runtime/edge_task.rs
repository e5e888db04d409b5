use dht22_core::cycle::EdgeOutcome;
use embassy_stm32::exti::ExtiInput;

use super::WORK_READY;
use crate::sensor::{self, SharedSensor, with_sensor};

/// Timestamps every data-line edge and hands it to the orchestrator.
#[embassy_executor::task]
pub async fn run(mut input: ExtiInput<'static>, sensor: &'static SharedSensor) -> ! {
    loop {
        input.wait_for_any_edge().await;
        let at = sensor::now();
        let outcome = with_sensor(sensor, |orchestrator| orchestrator.on_edge(at));
        if outcome != EdgeOutcome::Recorded {
            WORK_READY.signal(());
        }
    }
}
