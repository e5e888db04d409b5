use core::cell::RefCell;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, OutputOpenDrain, Pull, Speed};
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use static_cell::StaticCell;

use dht22_core::orchestrator::TriggerOrchestrator;

use crate::sensor::{self, BOOT_CONFIG, HardwareLine, SharedSensor};

mod console_task;
mod edge_task;
mod report_task;
mod timer_task;
mod worker_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Raised whenever the orchestrator may have queued deferred work.
pub(super) static WORK_READY: Signal<CriticalSectionRawMutex, ()> = Signal::new();
/// Raised whenever a timer deadline may have moved.
pub(super) static TIMERS_CHANGED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

static SENSOR: StaticCell<SharedSensor> = StaticCell::new();

/// Runs the edge task above the thread executor so edges are timestamped
/// while the worker busy-waits through the request pulse.
static EDGE_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

#[hal::interrupt]
unsafe fn USART1() {
    unsafe { EDGE_EXECUTOR.on_interrupt() }
}

/// Wakes both the worker and timer tasks after an out-of-band change.
pub(super) fn notify_changed() {
    WORK_READY.signal(());
    TIMERS_CHANGED.signal(());
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA6,
        PA7,
        EXTI7,
        PB0,
        PB1,
        USART5,
        ..
    } = hal::init(config);

    let sensor: &'static SharedSensor = SENSOR.init(Mutex::new(RefCell::new(
        TriggerOrchestrator::new(BOOT_CONFIG, sensor::now()),
    )));
    defmt::info!(
        "dht22: gpio {} autoupdate {} interval {}ms",
        BOOT_CONFIG.gpio,
        BOOT_CONFIG.timing.autoupdate(),
        BOOT_CONFIG.timing.interval_ms()
    );

    let line = HardwareLine::new(OutputOpenDrain::new(PA6, Level::High, Speed::Low));
    let sense = ExtiInput::new(PA7, EXTI7, Pull::None);

    hal::interrupt::USART1.set_priority(Priority::P1);
    let edge_spawner = EDGE_EXECUTOR.start(hal::interrupt::USART1);
    edge_spawner
        .spawn(edge_task::run(sense, sensor))
        .expect("failed to spawn edge task");

    spawner
        .spawn(worker_task::run(line, sensor))
        .expect("failed to spawn worker task");
    spawner
        .spawn(timer_task::run(sensor))
        .expect("failed to spawn timer task");
    spawner
        .spawn(report_task::run(sensor))
        .expect("failed to spawn report task");
    spawner
        .spawn(console_task::run(sensor, USART5, PB0, PB1))
        .expect("failed to spawn console task");

    core::future::pending::<()>().await;
}
