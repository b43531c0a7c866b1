use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use static_cell::StaticCell;

use crate::console::Banner;

const ECHO_BUFFER_SIZE: usize = 64;

static UART_TX_BUFFER: StaticCell<[u8; ECHO_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; ECHO_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

/// Prints the settings banner, then echoes every received byte.
#[embassy_executor::task]
pub async fn run(
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
    baud: u32,
    banner: Banner,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = baud;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = BufferedUart::new(
        usart,
        rx_pin,
        tx_pin,
        UART_TX_BUFFER.init([0; ECHO_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; ECHO_BUFFER_SIZE]),
        UartIrqs,
        config,
    )
    .expect("failed to initialize echo UART");

    let (mut uart_tx, mut uart_rx) = uart.split();

    if uart_tx.write_all(banner.as_bytes()).await.is_err() {
        defmt::warn!("echo: banner write failed");
    }

    let mut received = [0u8; ECHO_BUFFER_SIZE];
    loop {
        match uart_rx.read(&mut received).await {
            Ok(0) => {}
            Ok(count) => {
                if uart_tx.write_all(&received[..count]).await.is_err() {
                    defmt::warn!("echo: UART write error");
                    Timer::after(Duration::from_millis(5)).await;
                }
            }
            Err(_) => {
                defmt::warn!("echo: UART read error");
                Timer::after(Duration::from_millis(5)).await;
            }
        }
    }
}
