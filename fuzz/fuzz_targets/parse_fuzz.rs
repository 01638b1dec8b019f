//! Decoder fuzz target: feed arbitrary bytes to Session::parse_buffer.
//! The decoder must not panic; it returns Ok(Message) or Err(DecodeError).
//! Build with: cargo fuzz run parse_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    // Templates defined by one fuzz input feed data sets of the same input,
    // so run each through a fresh session in both store policies.
    for id_aliasing in [false, true] {
        let session = ipfix_session::Session::with_config(ipfix_session::SessionConfig {
            id_aliasing,
        });
        let _ = session.parse_buffer(data);
        let mut reader = data;
        let _ = session.parse_reader(&mut reader);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parse_fuzz");
}
