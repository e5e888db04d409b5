use dht22_core::attributes;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use static_cell::StaticCell;

use super::notify_changed;
use crate::console::{
    self, ConsoleOutcome, LineBuffer, Reply, is_status_request, render_line_error, render_status,
};
use crate::sensor::{self, SharedSensor, with_sensor};
use crate::status;

const CONSOLE_UART_BUFFER_SIZE: usize = 128;
const CONSOLE_UART_BAUD: u32 = 115_200;

static UART_TX_BUFFER: StaticCell<[u8; CONSOLE_UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; CONSOLE_UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

/// Attribute console on USART5 (PB0 TX, PB1 RX).
#[embassy_executor::task]
pub async fn run(
    sensor: &'static SharedSensor,
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = CONSOLE_UART_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let mut uart = BufferedUart::new(
        usart,
        rx_pin,
        tx_pin,
        UART_TX_BUFFER.init([0; CONSOLE_UART_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; CONSOLE_UART_BUFFER_SIZE]),
        UartIrqs,
        config,
    )
    .expect("failed to initialize console UART");

    let mut lines = LineBuffer::new();
    let mut reply = Reply::new();
    let mut ingress = [0u8; 16];

    loop {
        let count = match uart.read(&mut ingress).await {
            Ok(count) => count,
            Err(_) => {
                defmt::warn!("console: UART read error");
                Timer::after(Duration::from_millis(5)).await;
                continue;
            }
        };

        for byte in &ingress[..count] {
            let Some(line) = lines.ingest(*byte) else {
                continue;
            };

            match line {
                Ok(line) if is_status_request(line) => {
                    render_status(&mut reply, &status::snapshot(sensor::now()));
                }
                Ok(line) => {
                    let result = with_sensor(sensor, |orchestrator| {
                        attributes::execute(orchestrator, line, sensor::now())
                    });
                    console::render(&mut reply, &result);
                    if console::outcome(&result) == ConsoleOutcome::Changed {
                        notify_changed();
                    }
                }
                Err(error) => render_line_error(&mut reply, error),
            }

            if uart.write_all(reply.as_bytes()).await.is_err() {
                defmt::warn!("console: UART write error");
            }
        }
    }
}
