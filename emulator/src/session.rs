use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use dco_core::calibration::{
    CalibrationError, CalibrationReport, CalibrationTarget, Calibrator, REFERENCE_CRYSTAL_HZ,
};
use dco_core::oscillator::{HexByte, Oscillator, OscillatorState};
use dco_core::sim::{LinearDcoModel, SimulatedDco, SimulatedTimer};
use dco_core::timer::Ticks;

/// System clock the emulated board is calibrated towards.
pub const DEFAULT_TARGET_HZ: u32 = 16_000_000;

/// Power-on trim of the emulated oscillator (fine 0x60, range 7).
pub const RESET_STATE: OscillatorState = OscillatorState::new(0x60, 0x07);

const JITTER_SEED: u32 = 0x5EED_D0C0;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "calibrate",
        "calibrate [<ticks>|hz=<freq>]   - run startup calibration against the crystal",
    ),
    (
        "set",
        "set <fine> <range>              - load raw trim fields (hex or decimal)",
    ),
    (
        "reference",
        "reference <on|off>              - connect or disconnect the watch crystal",
    ),
    (
        "jitter",
        "jitter <ticks>                  - add capture noise (0 disables)",
    ),
    (
        "status",
        "status                          - show oscillator state and target",
    ),
    (
        "help",
        "help [topic]                    - show help for a command",
    ),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Nominal,
    Saturated,
    DeadReference,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Nominal => "evidence/emulator-nominal.log",
            TranscriptProfile::Saturated => "evidence/emulator-saturated.log",
            TranscriptProfile::DeadReference => "evidence/emulator-dead-reference.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Nominal => "DCO calibration emulator nominal transcript",
            TranscriptProfile::Saturated => "DCO calibration emulator saturated-target transcript",
            TranscriptProfile::DeadReference => {
                "DCO calibration emulator dead-reference transcript"
            }
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("nominal") {
            Ok(Self::Nominal)
        } else if tag.eq_ignore_ascii_case("saturated") {
            Ok(Self::Saturated)
        } else if tag.eq_ignore_ascii_case("dead-reference") {
            Ok(Self::DeadReference)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

/// Starting conditions for a session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionOptions {
    /// Target delta; derived from [`DEFAULT_TARGET_HZ`] when `None`.
    pub target: Option<Ticks>,
    pub start: OscillatorState,
    pub jitter: u16,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            target: None,
            start: RESET_STATE,
            jitter: 0,
        }
    }
}

pub struct Session {
    dco: SimulatedDco<LinearDcoModel>,
    calibrator: Calibrator,
    target: CalibrationTarget,
    reference_alive: bool,
    jitter: u16,
    jitter_seed: u32,
    transcript: TranscriptLogger,
    started_at: HostInstant,
}

impl Session {
    pub fn new(profile: TranscriptProfile, options: SessionOptions) -> io::Result<Self> {
        let calibrator = Calibrator::new();
        let target = match options.target {
            Some(delta) => CalibrationTarget::from_delta(delta),
            None => CalibrationTarget::from_frequency(
                DEFAULT_TARGET_HZ,
                REFERENCE_CRYSTAL_HZ,
                calibrator.config().divider,
            ),
        }
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;

        let transcript = TranscriptLogger::new(profile)?;

        Ok(Self {
            dco: SimulatedDco::new(LinearDcoModel::msp430_like(), options.start),
            calibrator,
            target,
            reference_alive: true,
            jitter: options.jitter,
            jitter_seed: JITTER_SEED,
            transcript,
            started_at: HostInstant::now(),
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let mut words = trimmed.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        let lines = match command.as_str() {
            "help" => help_lines(args.first().copied()),
            "status" => vec![self.status_line()],
            "calibrate" => self.calibrate(args.first().copied()),
            "set" => self.set_state(&args),
            "reference" => self.set_reference(args.first().copied()),
            "jitter" => self.set_jitter(args.first().copied()),
            other => vec![format!("ERR syntax unknown command `{other}`")],
        };

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    fn status_line(&self) -> String {
        let divider = self.calibrator.config().divider;
        format!(
            "dco {} freq={} Hz target={} ({} Hz) reference={} jitter={} writes={}",
            self.dco.state(),
            self.dco.frequency_hz(),
            self.target,
            self.target.frequency_hz(REFERENCE_CRYSTAL_HZ, divider),
            if self.reference_alive { "on" } else { "off" },
            self.jitter,
            self.dco.writes(),
        )
    }

    fn calibrate(&mut self, arg: Option<&str>) -> Vec<String> {
        let target = match arg {
            None => Ok(self.target),
            Some(value) => parse_target(value, &self.calibrator),
        };
        let target = match target {
            Ok(target) => target,
            Err(message) => return vec![format!("ERR target {message}")],
        };

        let mut timer = SimulatedTimer::new(&self.dco, REFERENCE_CRYSTAL_HZ);
        if !self.reference_alive {
            timer = timer.with_dead_reference();
        }
        if self.jitter > 0 {
            timer = timer.with_jitter(self.jitter, self.jitter_seed);
            self.jitter_seed = self.jitter_seed.rotate_left(7) ^ 0x9E37_79B9;
        }

        let mut handle = self.dco.handle();
        let outcome = self.calibrator.run(&mut timer, &mut handle, target);

        let trace = self.calibrator.trace();
        let mut lines = Vec::new();
        let retained = u32::try_from(trace.len()).unwrap_or(u32::MAX);
        let overwritten = trace.recorded().saturating_sub(retained);
        if overwritten > 0 {
            lines.push(format!("... {overwritten} earlier trace records overwritten"));
        }
        lines.extend(
            trace
                .oldest_first()
                .map(|record| format!("#{:<5} {}", record.id, record.event)),
        );

        match outcome {
            Ok(report) => {
                lines.push(describe_report(&report, timer.edges()));
                lines.extend(settings_banner(report.state));
            }
            Err(error) => {
                lines.push(describe_error(&error));
                lines.push(format!("dco left at {}", handle.state()));
            }
        }
        lines
    }

    fn set_state(&mut self, args: &[&str]) -> Vec<String> {
        let parsed = match args {
            [fine, range] => parse_byte(fine).zip(parse_byte(range)),
            _ => None,
        };
        let Some((fine, range)) = parsed else {
            return vec!["ERR syntax expected `set <fine> <range>`".to_string()];
        };

        let state = OscillatorState::new(fine, range);
        self.dco.handle().apply(state);

        let geometry = self.dco.handle().geometry();
        let mut lines = vec![format!("OK dco {state} freq={} Hz", self.dco.frequency_hz())];
        if !geometry.contains(state) {
            lines.push(format!(
                "note: outside trim span, calibration will start from {}",
                geometry.clamp(state)
            ));
        }
        lines
    }

    fn set_reference(&mut self, arg: Option<&str>) -> Vec<String> {
        match arg.map(str::to_ascii_lowercase).as_deref() {
            Some("on") => self.reference_alive = true,
            Some("off") => self.reference_alive = false,
            _ => return vec!["ERR syntax expected `reference <on|off>`".to_string()],
        }
        vec![format!(
            "OK reference {}",
            if self.reference_alive { "on" } else { "off" }
        )]
    }

    fn set_jitter(&mut self, arg: Option<&str>) -> Vec<String> {
        match arg.and_then(|value| value.parse::<u16>().ok()) {
            Some(amplitude) => {
                self.jitter = amplitude;
                vec![format!("OK jitter {amplitude}")]
            }
            None => vec!["ERR syntax expected `jitter <ticks>`".to_string()],
        }
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn parse_target(value: &str, calibrator: &Calibrator) -> Result<CalibrationTarget, String> {
    let target = if let Some(hz) = value.strip_prefix("hz=") {
        let hz = hz
            .parse::<u32>()
            .map_err(|_| format!("invalid frequency `{hz}`"))?;
        CalibrationTarget::from_frequency(hz, REFERENCE_CRYSTAL_HZ, calibrator.config().divider)
    } else {
        let delta = value
            .parse::<Ticks>()
            .map_err(|_| format!("invalid tick count `{value}`"))?;
        CalibrationTarget::from_delta(delta)
    };
    target.map_err(|err| err.to_string())
}

fn parse_byte(value: &str) -> Option<u8> {
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn describe_report(report: &CalibrationReport, edges: u32) -> String {
    format!(
        "OK calibrated {} delta={} iterations={} adjustments={} handoffs={} edges={}",
        report.state,
        report.final_delta,
        report.iterations,
        report.adjustments,
        report.range_handoffs,
        edges,
    )
}

fn describe_error(error: &CalibrationError) -> String {
    let kind = match error {
        CalibrationError::ReferenceMissing { .. } => "reference",
        CalibrationError::TargetUnreachable { .. } => "unreachable",
        CalibrationError::InvalidTarget(_) => "target",
    };
    format!("ERR {kind} {error}")
}

/// Calibrated trim fields in the format the firmware prints on its console.
fn settings_banner(state: OscillatorState) -> [String; 2] {
    [
        ">>Calibrated oscillator values are:".to_string(),
        format!(
            "   FINE=0x{} RANGE=0x{}",
            HexByte(state.fine_tap),
            HexByte(state.range_select)
        ),
    ]
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy, Debug)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_round_trip_through_tags() {
        for (tag, profile) in [
            ("nominal", TranscriptProfile::Nominal),
            ("SATURATED", TranscriptProfile::Saturated),
            ("dead-reference", TranscriptProfile::DeadReference),
        ] {
            assert_eq!(TranscriptProfile::from_tag(tag), Ok(profile));
        }
        assert!(TranscriptProfile::from_tag("reboot").is_err());
    }

    #[test]
    fn bytes_parse_as_hex_or_decimal() {
        assert_eq!(parse_byte("0x60"), Some(0x60));
        assert_eq!(parse_byte("0XfF"), Some(0xFF));
        assert_eq!(parse_byte("7"), Some(7));
        assert_eq!(parse_byte("256"), None);
        assert_eq!(parse_byte("0xg1"), None);
    }

    #[test]
    fn targets_parse_from_ticks_or_frequency() {
        let calibrator = Calibrator::new();
        assert_eq!(
            parse_target("hz=16000000", &calibrator).map(CalibrationTarget::delta),
            Ok(3906)
        );
        assert_eq!(
            parse_target("4096", &calibrator).map(CalibrationTarget::delta),
            Ok(4096)
        );
        assert!(parse_target("0", &calibrator).is_err());
        assert!(parse_target("hz=fast", &calibrator).is_err());
    }

    #[test]
    fn banner_uses_two_digit_hex() {
        let [headline, values] = settings_banner(OscillatorState::new(0x0A, 0x02));
        assert_eq!(headline, ">>Calibrated oscillator values are:");
        assert_eq!(values, "   FINE=0x0A RANGE=0x02");
    }
}
