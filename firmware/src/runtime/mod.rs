use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use dco_core::calibration::{
    CalibrationConfig, CalibrationError, CalibrationTarget, Calibrator, REFERENCE_CRYSTAL_HZ,
};
use dco_core::oscillator::{Oscillator, OscillatorState};
use dco_core::timer::ReferenceDivider;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::rcc::{LsConfig, Mco, McoPrescaler, McoSource};
use embassy_time::{Duration, Timer};

use crate::console::{self, ClockSource};
use crate::hw::capture::Tim16LseCapture;
use crate::hw::hsi::HsiOscillator;
use crate::telemetry;

mod echo_task;

/// SYSCLK the HSI is trimmed towards.
const TARGET_SYSCLK_HZ: u32 = 16_000_000;

/// HSI trim steps are about 0.3 %, over ten ticks at /8. Capturing every LSE
/// edge keeps one trim step near one tick so an exact match is reachable.
const CAPTURE_DIVIDER: ReferenceDivider = ReferenceDivider::Div1;

/// Echo console line rate, 8-N-1.
const ECHO_BAUD: u32 = 9_600;

/// Extra time for the watch crystal to stabilise after LSERDY.
const REFERENCE_SETTLE: Duration = Duration::from_millis(500);

/// Trim measured on a previous run. When set, calibration is skipped.
const PRECALIBRATED: Option<OscillatorState> = None;

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

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let mut config = hal::Config::default();
    config.rcc.ls = LsConfig::default_lse();
    let hal::Peripherals {
        TIM16,
        MCO,
        PA8,
        PB0,
        PB1,
        USART5,
        ..
    } = hal::init(config);

    // Undivided SYSCLK on PA8 for external measurement.
    let _mco = Mco::new(MCO, PA8, McoSource::SYSCLK, McoPrescaler::DIV1);

    let mut oscillator = HsiOscillator::new();
    let (source, state) = if let Some(stored) = PRECALIBRATED {
        oscillator.apply(stored);
        telemetry::log_precalibrated(stored);
        (ClockSource::Precalibrated, stored)
    } else {
        Timer::after(REFERENCE_SETTLE).await;
        let mut timer = Tim16LseCapture::new(TIM16);
        calibrate_sysclk(&mut timer, &mut oscillator)
    };

    let banner = console::settings_banner(source, state).unwrap_or_else(|_| {
        defmt::warn!("console: settings banner overflowed");
        console::Banner::new()
    });

    spawner
        .spawn(echo_task::run(USART5, PB0, PB1, ECHO_BAUD, banner))
        .expect("failed to spawn echo task");

    core::future::pending::<()>().await;
}

fn calibrate_sysclk(
    timer: &mut Tim16LseCapture<'_>,
    oscillator: &mut HsiOscillator,
) -> (ClockSource, OscillatorState) {
    let mut calibrator =
        Calibrator::with_config(CalibrationConfig::new().with_divider(CAPTURE_DIVIDER));

    let outcome =
        CalibrationTarget::from_frequency(TARGET_SYSCLK_HZ, REFERENCE_CRYSTAL_HZ, CAPTURE_DIVIDER)
            .map_err(CalibrationError::from)
            .and_then(|target| calibrator.run(timer, oscillator, target));

    telemetry::log_trace(calibrator.trace());

    match outcome {
        Ok(report) => {
            telemetry::log_report(&report);
            (ClockSource::Calibrated, report.state)
        }
        Err(error) => {
            let state = oscillator.state();
            telemetry::log_failure(&error, state);
            (ClockSource::Uncalibrated, state)
        }
    }
}
