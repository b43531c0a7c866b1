//! TIM16 input capture of the LSE watch crystal.
//!
//! TIM16 counts the timer kernel clock (SYSCLK with the default APB
//! prescaler) and latches its counter into CCR1 on rising edges of TI1,
//! which `TIM16_TISEL` routes to LSE. The input prescaler `IC1PSC` provides
//! the reference divider.

use dco_core::timer::{CaptureSetup, CaptureTimer, CountMode, ReferenceDivider, Ticks, TimerConfig};
use embassy_stm32::Peri;
use embassy_stm32::pac;
use embassy_stm32::pac::timer::Tim1ch;
use embassy_stm32::pac::timer::regs::Sr1ch;
use embassy_stm32::pac::timer::vals::CcmrInputCcs;
use embassy_stm32::peripherals::TIM16;
use embassy_stm32::timer::low_level::{InputTISelection, Timer};

/// Capture/compare channel 1.
const CH1: usize = 0;

/// `TI1SEL` value selecting LSE.
const TI1SEL_LSE: u8 = 0b0010;

/// TIM16 configured to capture LSE edges.
pub struct Tim16LseCapture<'d> {
    timer: Timer<'d, TIM16>,
    divider: ReferenceDivider,
    prescaler: u16,
    reload: u16,
}

impl<'d> Tim16LseCapture<'d> {
    /// Enables and resets TIM16 and leaves it stopped. The kernel clock is
    /// gated off again when the capture is dropped.
    pub fn new(timer: Peri<'d, TIM16>) -> Self {
        let timer = Timer::new(timer);
        let regs = timer.regs_1ch();
        let prescaler = regs.psc().read();
        let reload = regs.arr().read().arr();

        Self {
            timer,
            divider: ReferenceDivider::default(),
            prescaler,
            reload,
        }
    }

    fn regs(&self) -> Tim1ch {
        self.timer.regs_1ch()
    }

    fn running(&self) -> bool {
        self.regs().cr1().read().cen()
    }

    fn capture_armed(&self) -> bool {
        let regs = self.regs();
        let direct_ti1 = CcmrInputCcs::from(InputTISelection::Normal);
        regs.ccer().read().cce(CH1) && regs.ccmr_input(0).read().ccs(CH1) == direct_ti1
    }

    fn arm_capture(&self, divider: ReferenceDivider) {
        let regs = self.regs();
        regs.ccer().modify(|w| {
            w.set_cce(CH1, false);
            w.set_ccp(CH1, false);
            w.set_ccnp(CH1, false);
        });
        pac::TIM16.tisel().modify(|w| w.set_tisel(CH1, TI1SEL_LSE));
        regs.ccmr_input(0).modify(|w| {
            w.set_ccs(CH1, InputTISelection::Normal.into());
            w.set_icpsc(CH1, divider.bits());
        });
        regs.ccer().modify(|w| w.set_cce(CH1, true));
    }

    fn disarm_capture(&self) {
        let regs = self.regs();
        regs.ccer().modify(|w| w.set_cce(CH1, false));
        regs.ccmr_input(0).modify(|w| {
            w.set_ccs(CH1, CcmrInputCcs::from_bits(0));
            w.set_icpsc(CH1, 0);
        });
        pac::TIM16.tisel().modify(|w| w.set_tisel(CH1, 0));
    }

    fn start_counting(&self) {
        let regs = self.regs();
        regs.psc().write_value(0);
        regs.arr().write(|w| w.set_arr(Ticks::MAX));
        regs.egr().write(|w| w.set_ug(true));
        regs.sr().write_value(Sr1ch(0));
        regs.cr1().modify(|w| w.set_cen(true));
    }

    fn stop_counting(&self) {
        let regs = self.regs();
        regs.cr1().modify(|w| w.set_cen(false));
        regs.psc().write_value(self.prescaler);
        regs.arr().write(|w| w.set_arr(self.reload));
        regs.egr().write(|w| w.set_ug(true));
    }
}

impl CaptureTimer for Tim16LseCapture<'_> {
    fn config(&self) -> TimerConfig {
        let mode = if self.running() {
            CountMode::Continuous
        } else {
            CountMode::Stopped
        };
        let (capture, divider) = if self.capture_armed() {
            let bits = self.regs().ccmr_input(0).read().icpsc(CH1);
            (
                CaptureSetup::ReferenceRisingEdge,
                ReferenceDivider::from_bits(bits),
            )
        } else {
            (CaptureSetup::Disabled, self.divider)
        };

        TimerConfig {
            mode,
            capture,
            divider,
        }
    }

    fn configure(&mut self, config: TimerConfig) {
        if config.mode == CountMode::Stopped {
            self.stop_counting();
        }

        match config.capture {
            CaptureSetup::ReferenceRisingEdge => self.arm_capture(config.divider),
            CaptureSetup::Disabled => self.disarm_capture(),
        }
        self.divider = config.divider;

        if config.mode == CountMode::Continuous && !self.running() {
            self.start_counting();
        }
    }

    fn capture_pending(&self) -> bool {
        self.regs().sr().read().ccif(CH1)
    }

    fn take_capture(&mut self) -> Ticks {
        let regs = self.regs();
        let captured = regs.ccr(CH1).read().ccr();
        // rc_w0: zeros clear, ones leave other flags alone.
        let mut clear = Sr1ch(!0);
        clear.set_ccif(CH1, false);
        clear.set_ccof(CH1, false);
        regs.sr().write_value(clear);
        captured
    }
}
