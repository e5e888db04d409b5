use embassy_futures::select::{Either, select};
use embassy_time::Timer;

use super::{TIMERS_CHANGED, WORK_READY};
use crate::sensor::{self, SharedSensor, with_sensor};

/// Sleeps until the orchestrator's next deadline and fires it.
///
/// A change signal restarts the wait so moved or new deadlines are honoured.
#[embassy_executor::task]
pub async fn run(sensor: &'static SharedSensor) -> ! {
    loop {
        let deadline = with_sensor(sensor, |orchestrator| orchestrator.next_deadline());
        let Some(deadline) = deadline else {
            TIMERS_CHANGED.wait().await;
            continue;
        };

        match select(Timer::at(sensor::instant_at(deadline)), TIMERS_CHANGED.wait()).await {
            Either::First(()) => {
                with_sensor(sensor, |orchestrator| orchestrator.poll_timers(sensor::now()));
                WORK_READY.signal(());
            }
            Either::Second(()) => {}
        }
    }
}
