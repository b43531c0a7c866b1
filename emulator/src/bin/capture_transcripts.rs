use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, SessionOptions, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Nominal)?;
    record_profile(TranscriptProfile::Saturated)?;
    record_profile(TranscriptProfile::DeadReference)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile, SessionOptions::default())?;
    match profile {
        TranscriptProfile::Nominal => record_nominal(&mut session),
        TranscriptProfile::Saturated => record_saturated(&mut session),
        TranscriptProfile::DeadReference => record_dead_reference(&mut session),
    }
}

fn record_nominal(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("calibrate")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("set 0x00 0x0F")?;
    let _ = session.handle_command("calibrate hz=16000000")?;
    let _ = session.handle_command("jitter 1")?;
    let _ = session.handle_command("set 0xF0 0x01")?;
    let _ = session.handle_command("calibrate")?;
    Ok(())
}

fn record_saturated(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("calibrate hz=30000000")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("set 0x20 0x00")?;
    let _ = session.handle_command("calibrate 3000")?;
    let _ = session.handle_command("set 0x10 0x1F")?;
    let _ = session.handle_command("calibrate")?;
    Ok(())
}

fn record_dead_reference(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("reference off")?;
    let _ = session.handle_command("calibrate")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("reference on")?;
    let _ = session.handle_command("calibrate")?;
    Ok(())
}
