use crate::command::{ExitCode, InputSink, OutputSource, Runnable, RunnableError};
use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Thread body transferring bytes from one stream to another.
///
/// Terminates on end of stream or on an I/O error in either stream; errors are never
/// propagated, a broken pipe simply ends the transfer. The source is always closed at the
/// end. The sink is closed too unless the relay was built with [`StreamRelay::keep_sink_open`],
/// in which case it is handed back through the join handle.
pub struct StreamRelay {
    from: OutputSource,
    to: InputSink,
    close_to: bool,
}

impl StreamRelay {
    pub fn new(from: OutputSource, to: InputSink) -> Self {
        Self {
            from,
            to,
            close_to: true,
        }
    }

    /// Do not close the sink when the source ends; it is returned by [`StreamRelay::run`].
    pub fn keep_sink_open(mut self) -> Self {
        self.close_to = false;
        self
    }

    /// Copy until end of stream or the first failure.
    pub fn run(mut self) -> Option<InputSink> {
        match io::copy(&mut self.from, &mut self.to) {
            Ok(bytes) => debug!(bytes, "relay reached end of stream"),
            // Either of two pipes became broken
            Err(e) => debug!(error = %e, "relay stopped"),
        }
        let _ = self.to.flush();
        drop(self.from);
        if self.close_to { None } else { Some(self.to) }
    }

    pub fn spawn(self) -> io::Result<JoinHandle<Option<InputSink>>> {
        thread::Builder::new()
            .name("stream-relay".to_string())
            .spawn(move || self.run())
    }
}

/// Two runnables spliced together: the output of `left` feeds the input of `right`.
///
/// The composite's stdin is the stdin of `left` and its stdout is the stdout of `right`.
/// Longer pipelines are built by folding: `((a | b) | c) | d`.
///
/// The exit code is known once both sides have terminated: it is the code of `left` if
/// that one failed, otherwise the code of `right`.
pub struct PipedRunnable {
    left: Box<dyn Runnable>,
    right: Box<dyn Runnable>,
    relay: Option<JoinHandle<Option<InputSink>>>,
    started: bool,
}

impl PipedRunnable {
    pub fn new(left: Box<dyn Runnable>, right: Box<dyn Runnable>) -> Self {
        Self {
            left,
            right,
            relay: None,
            started: false,
        }
    }
}

/// Exit code of a pipeline `a | b` given the codes of its sides.
pub fn combine_exit_codes(left: ExitCode, right: ExitCode) -> ExitCode {
    if left != 0 { left } else { right }
}

impl Runnable for PipedRunnable {
    fn start(&mut self, inherit_stdin: bool, inherit_stdout: bool) -> Result<(), RunnableError> {
        if self.started {
            return Err(RunnableError::AlreadyStarted);
        }
        self.started = true;
        self.left.start(inherit_stdin, false)?;
        self.right.start(false, inherit_stdout)?;

        // Both ends exist for any started runnable in standalone mode; if one is missing
        // the other is dropped here, which closes it.
        if let (Some(from), Some(to)) = (self.left.take_stdout(), self.right.take_stdin()) {
            self.relay = Some(StreamRelay::new(from, to).spawn()?);
        }
        Ok(())
    }

    fn take_stdin(&mut self) -> Option<InputSink> {
        self.left.take_stdin()
    }

    fn take_stdout(&mut self) -> Option<OutputSource> {
        self.right.take_stdout()
    }

    fn exit_code(&mut self) -> Option<ExitCode> {
        let left = self.left.exit_code();
        let right = self.right.exit_code();
        Some(combine_exit_codes(left?, right?))
    }

    fn wait_for_termination(&mut self) -> Result<ExitCode, RunnableError> {
        if !self.started {
            return Err(RunnableError::NotStarted);
        }
        let left = self.left.wait_for_termination()?;
        let right = self.right.wait_for_termination()?;
        if let Some(relay) = self.relay.take() {
            let _ = relay.join();
        }
        Ok(combine_exit_codes(left, right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::run_captured;
    use crate::env::Environment;
    use crate::external::ExternalProcess;
    use crate::in_process::InProcess;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::{Cursor, Read};

    fn exiting_with(code: ExitCode) -> Box<dyn Runnable> {
        Box::new(InProcess::new("exit-code", move |_, _| code))
    }

    fn expect_input(expected: &'static [u8], produce: &'static [u8]) -> Box<dyn Runnable> {
        Box::new(InProcess::new("expect", move |input, output| {
            let mut received = Vec::new();
            if input.read_to_end(&mut received).is_err() || received != expected {
                return 100;
            }
            let _ = output.write_all(produce);
            0
        }))
    }

    #[rstest]
    #[case(0, 0, 0)]
    #[case(0, 1, 1)]
    #[case(1, 0, 1)]
    #[case(1, 2, 1)]
    fn exit_code_law(#[case] left: ExitCode, #[case] right: ExitCode, #[case] expected: ExitCode) {
        let mut piped = PipedRunnable::new(exiting_with(left), exiting_with(right));
        let (code, out) = run_captured(&mut piped, b"").unwrap();
        assert_eq!(out, b"");
        assert_eq!(code, expected);
        assert_eq!(piped.exit_code(), Some(expected));
    }

    #[test]
    fn output_of_left_feeds_right() {
        let mut piped = PipedRunnable::new(expect_input(b"ab", b"cd"), expect_input(b"cd", b"ef"));
        let (code, out) = run_captured(&mut piped, b"ab").unwrap();
        assert_eq!(code, 0);
        assert_eq!(String::from_utf8(out).unwrap(), "ef");
    }

    #[test]
    fn folded_pipelines_chain_all_stages() {
        let first = PipedRunnable::new(expect_input(b"1", b"2"), expect_input(b"2", b"3"));
        let mut chain = PipedRunnable::new(Box::new(first), expect_input(b"3", b"4"));
        let (code, out) = run_captured(&mut chain, b"1").unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, b"4");
    }

    #[test]
    fn failing_external_processes_fail_the_pipeline() {
        let left = ExternalProcess::new("some-unexisting-process-a", Vec::new(), Environment::default());
        let right = ExternalProcess::new("some-unexisting-process-b", Vec::new(), Environment::default());
        let mut piped = PipedRunnable::new(Box::new(left), Box::new(right));
        let (code, out) = run_captured(&mut piped, b"").unwrap();
        assert_ne!(code, 0);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "some-unexisting-process-b: command not found\n"
        );
    }

    #[test]
    fn right_side_quitting_early_does_not_hang() {
        let producer = InProcess::new("producer", |_, output| {
            for _ in 0..100_000 {
                let _ = output.write_all(b"spam\n");
            }
            0
        });
        let quitter = InProcess::new("quitter", |_, output| {
            let _ = output.write_all(b"done\n");
            0
        });
        let mut piped = PipedRunnable::new(Box::new(producer), Box::new(quitter));
        let (code, out) = run_captured(&mut piped, b"").unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, b"done\n");
    }

    #[test]
    fn relay_closes_sink_by_default() {
        let (mut reader, writer) = io::pipe().unwrap();
        let relay = StreamRelay::new(Box::new(Cursor::new(b"payload".to_vec())), Box::new(writer));
        assert!(relay.run().is_none());

        let mut received = String::new();
        reader.read_to_string(&mut received).unwrap();
        assert_eq!(received, "payload");
    }

    #[test]
    fn relay_can_keep_sink_open() {
        let relay = StreamRelay::new(Box::new(Cursor::new(b"first".to_vec())), Box::new(Vec::<u8>::new()))
            .keep_sink_open();
        assert!(relay.run().is_some());
    }

    #[test]
    fn relay_stops_on_broken_sink() {
        let (reader, writer) = io::pipe().unwrap();
        drop(reader);
        let relay = StreamRelay::new(Box::new(Cursor::new(vec![0u8; 1 << 20])), Box::new(writer));
        assert!(relay.run().is_none());
    }

    #[test]
    fn wait_before_start_fails() {
        let mut piped = PipedRunnable::new(exiting_with(0), exiting_with(0));
        assert!(matches!(piped.wait_for_termination(), Err(RunnableError::NotStarted)));
        assert_eq!(piped.exit_code(), None);
    }
}
