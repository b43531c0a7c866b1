mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use dco_core::oscillator::OscillatorState;
use session::{Session, SessionOptions, TranscriptProfile};

const USAGE: &str = "Usage: dco-emulator [--profile <nominal|saturated|dead-reference>] \
[--target <ticks>] [--fine <byte>] [--range <byte>] [--jitter <ticks>]";

fn main() -> io::Result<()> {
    let (profile, options) = parse_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(profile, options)?;
    let mut line = String::new();

    writeln!(
        writer,
        "DCO calibration emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_args<I>(args: I) -> Result<(TranscriptProfile, SessionOptions), String>
where
    I: IntoIterator<Item = String>,
{
    let mut profile = TranscriptProfile::Nominal;
    let mut options = SessionOptions::default();
    let mut fine = options.start.fine_tap;
    let mut range = options.start.range_select;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };

        if !flag.starts_with("--") {
            profile = TranscriptProfile::from_tag(&flag)?;
            continue;
        }

        let value = match inline {
            Some(value) => value,
            None => args
                .next()
                .ok_or_else(|| format!("Expected value after {flag}"))?,
        };

        match flag.as_str() {
            "--profile" => profile = TranscriptProfile::from_tag(&value)?,
            "--target" => options.target = Some(parse_number(&flag, &value)?),
            "--fine" => fine = parse_number(&flag, &value)?,
            "--range" => range = parse_number(&flag, &value)?,
            "--jitter" => options.jitter = parse_number(&flag, &value)?,
            other => return Err(format!("Unknown option `{other}`")),
        }
    }

    options.start = OscillatorState::new(fine, range);
    Ok((profile, options))
}

fn parse_number<T>(flag: &str, value: &str) -> Result<T, String>
where
    T: TryFrom<u32>,
{
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };

    parsed
        .ok()
        .and_then(|number| T::try_from(number).ok())
        .ok_or_else(|| format!("Invalid value `{value}` for {flag}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| (*arg).to_string()).collect()
    }

    #[test]
    fn defaults_to_nominal_profile_and_reset_state() {
        let (profile, options) = parse_args(args(&[])).unwrap();
        assert_eq!(profile, TranscriptProfile::Nominal);
        assert_eq!(options, SessionOptions::default());
    }

    #[test]
    fn flags_accept_separate_or_inline_values() {
        let (profile, options) = parse_args(args(&[
            "--profile=saturated",
            "--target",
            "4000",
            "--fine=0x10",
            "--range",
            "3",
            "--jitter=2",
        ]))
        .unwrap();

        assert_eq!(profile, TranscriptProfile::Saturated);
        assert_eq!(options.target, Some(4000));
        assert_eq!(options.start, OscillatorState::new(0x10, 3));
        assert_eq!(options.jitter, 2);
    }

    #[test]
    fn positional_profile_is_accepted() {
        let (profile, _) = parse_args(args(&["dead-reference"])).unwrap();
        assert_eq!(profile, TranscriptProfile::DeadReference);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse_args(args(&["--fine", "300"])).is_err());
        assert!(parse_args(args(&["--target"])).is_err());
        assert!(parse_args(args(&["--speed", "1"])).is_err());
    }
}
