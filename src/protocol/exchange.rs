//! One request/response round with a bounded deadline.
//!
//! Every bootloader command goes through [`exchange`]: it writes the
//! request, then feeds each inbound chunk - concatenated in arrival order -
//! to the caller's parser until the parser completes, the parser rejects, or
//! the deadline expires. Whichever happens first decides the round; the
//! parser is never called again afterwards. This is the only place that
//! watches the clock, so the command layer stays free of timing concerns.

use std::time::{Duration, Instant};

use hexplay::HexViewBuilder;
use log::{log_enabled, trace, Level::Trace};

use crate::error::{Error, Result};
use crate::uart::UartPort;

/// How long one inbound poll may sleep before the deadline is re-checked.
const POLL_SLICE: Duration = Duration::from_millis(5);

/// What a parser decided after seeing the reply accumulated so far.
pub(crate) enum Step<T> {
    /// Not enough bytes yet; keep collecting.
    Wait,
    /// The reply is complete.
    Done(T),
}

/// Run one framed exchange: send `request`, collect the reply through
/// `parse`, resolve within `deadline`.
pub(crate) fn exchange<T>(
    port: &mut dyn UartPort,
    request: &[u8],
    deadline: Duration,
    parse: &mut dyn FnMut(&[u8]) -> Result<Step<T>>,
) -> Result<T> {
    let started = Instant::now();

    if log_enabled!(Trace) {
        let view = HexViewBuilder::new(request)
            .address_offset(0)
            .row_width(16)
            .finish();
        trace!("-->\n{}", view);
    }
    port.write_all(request).map_err(Error::SerialWriteFailed)?;

    let mut reply: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let elapsed = started.elapsed();
        if elapsed >= deadline {
            return Err(Error::Timeout(deadline.as_millis() as u64));
        }
        let wait = POLL_SLICE.min(deadline - elapsed);
        let len = port
            .poll_chunk(&mut chunk, wait)
            .map_err(Error::SerialReadFailed)?;
        if len == 0 {
            continue;
        }
        reply.extend_from_slice(&chunk[..len]);
        if log_enabled!(Trace) {
            let view = HexViewBuilder::new(&reply)
                .address_offset(0)
                .row_width(16)
                .finish();
            trace!("<--\n{}", view);
        }
        if let Step::Done(value) = parse(&reply)? {
            return Ok(value);
        }
    }
}

/// Time left of a shared deadline, for commands made of several exchanges.
pub(crate) fn remaining_budget(started: Instant, budget: Duration) -> Result<Duration> {
    budget
        .checked_sub(started.elapsed())
        .ok_or_else(|| Error::Timeout(budget.as_millis() as u64))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// A port that replays scripted chunks, one per poll.
    struct ScriptedPort {
        written: Vec<Vec<u8>>,
        chunks: VecDeque<Vec<u8>>,
    }

    impl ScriptedPort {
        fn new(chunks: &[&[u8]]) -> Self {
            ScriptedPort {
                written: Vec::new(),
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            }
        }
    }

    impl UartPort for ScriptedPort {
        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.push(bytes.to_vec());
            Ok(())
        }

        fn poll_chunk(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => {
                    std::thread::sleep(wait);
                    Ok(0)
                }
            }
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn completes_on_parser_success() {
        let mut port = ScriptedPort::new(&[&[0x79]]);
        let value = exchange(
            &mut port,
            &[0x7F],
            Duration::from_millis(100),
            &mut |reply| Ok(Step::Done(reply[0])),
        )
        .unwrap();
        assert_eq!(value, 0x79);
        assert_eq!(port.written, vec![vec![0x7F]]);
    }

    #[test]
    fn reassembles_single_byte_chunks() {
        let mut port = ScriptedPort::new(&[&[0x01], &[0x02], &[0x03]]);
        let value = exchange(
            &mut port,
            &[0x00],
            Duration::from_millis(100),
            &mut |reply| {
                if reply.len() < 3 {
                    Ok(Step::Wait)
                } else {
                    Ok(Step::Done(reply.to_vec()))
                }
            },
        )
        .unwrap();
        assert_eq!(value, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn times_out_when_no_reply_arrives() {
        let mut port = ScriptedPort::new(&[]);
        let result = exchange(
            &mut port,
            &[0x7F],
            Duration::from_millis(20),
            &mut |_| -> Result<Step<()>> { panic!("parser must not run without bytes") },
        );
        assert!(matches!(result, Err(Error::Timeout(20))));
    }

    #[test]
    fn parser_runs_at_most_once_after_completion() {
        let mut port = ScriptedPort::new(&[&[0x79], &[0x55]]);
        let mut calls = 0;
        let _ = exchange(
            &mut port,
            &[0x7F],
            Duration::from_millis(100),
            &mut |_| {
                calls += 1;
                Ok(Step::Done(()))
            },
        )
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn parser_error_ends_the_round() {
        let mut port = ScriptedPort::new(&[&[0x1F], &[0x79]]);
        let mut calls = 0;
        let result = exchange(
            &mut port,
            &[0x7F],
            Duration::from_millis(100),
            &mut |reply| -> Result<Step<()>> {
                calls += 1;
                Err(Error::UnexpectedByte {
                    phase: "autobaud",
                    expected: 0x79,
                    got: reply[0],
                })
            },
        );
        assert!(matches!(
            result,
            Err(Error::UnexpectedByte {
                phase: "autobaud",
                got: 0x1F,
                ..
            })
        ));
        assert_eq!(calls, 1);
    }
}
