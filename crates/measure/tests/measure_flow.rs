//! End-to-end measurement flow against a scripted channel

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;

use jcbench::{Context, MeasureCase};
use jcbench_apdu_core::{
    Channel, ChannelError, Protocol, ProtocolPreference, ResetKind,
};

type ChannelResult<T> = Result<T, ChannelError>;

/// Channel answering 90 00 with scripted per-exchange elapsed times; once
/// the script is exhausted, transmits fail.
#[derive(Debug)]
struct TimedChannel {
    elapsed: Vec<Duration>,
    transmits: usize,
    resets: usize,
}

impl TimedChannel {
    fn new(elapsed_ms: &[u64]) -> Self {
        Self {
            elapsed: elapsed_ms.iter().map(|&ms| Duration::from_millis(ms)).collect(),
            transmits: 0,
            resets: 0,
        }
    }
}

impl Channel for TimedChannel {
    fn open(&mut self, _preference: ProtocolPreference) -> ChannelResult<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn close(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    fn reset(
        &mut self,
        _preference: Option<ProtocolPreference>,
        _kind: ResetKind,
    ) -> ChannelResult<()> {
        self.resets += 1;
        Ok(())
    }

    fn protocol(&self) -> ChannelResult<Protocol> {
        Ok(Protocol::T1)
    }

    fn atr(&self) -> ChannelResult<Bytes> {
        Ok(Bytes::from_static(&[0x3B, 0x00]))
    }

    fn transmit_raw(&mut self, _command: &[u8]) -> ChannelResult<(Bytes, Duration)> {
        if self.transmits >= self.elapsed.len() {
            return Err(ChannelError::Transmit("script exhausted".into()));
        }
        let elapsed = self.elapsed[self.transmits];
        self.transmits += 1;
        Ok((Bytes::from_static(&[0x90, 0x00]), elapsed))
    }
}

fn select_case(round: usize) -> MeasureCase {
    let description: jcbench::CaseDescription = serde_json::from_str(&format!(
        r#"{{
            "name": "select",
            "description": "SELECT round trip",
            "round": {round},
            "setup": "Select a000000151000000",
            "teardown": "Reset",
            "adjust": "Select a000000151000000",
            "test": "Select a000000151000000"
        }}"#
    ))
    .unwrap();
    MeasureCase::from_description(Path::new("select.json"), description).unwrap()
}

#[test]
fn test_measurement_arithmetic() {
    // setup, then three adjust samples, then three test samples; the
    // reported value is 1 / (min(test) - min(adjust)) = 1 / 0.020 s
    let channel = TimedChannel::new(&[5, 10, 12, 11, 30, 32, 31]);
    let mut ctx = Context::new(channel);

    select_case(3).run(&mut ctx);

    let rows = ctx.reporter.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "select");
    assert_eq!(rows[0].1, "50.00 INS/S");
    assert_eq!(rows[0].2, "SELECT round trip");

    // teardown ran exactly once
    assert_eq!(ctx.transport.channel().resets, 1);
    assert_eq!(ctx.transport.channel().transmits, 7);
}

#[test]
fn test_failing_adjust_reports_failure_and_runs_teardown() {
    // only the setup exchange is scripted; every adjust round fails
    let channel = TimedChannel::new(&[5]);
    let mut ctx = Context::new(channel);

    select_case(3).run(&mut ctx);

    let rows = ctx.reporter.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, "failed");

    // the test phase never ran, teardown still did, exactly once
    assert_eq!(ctx.transport.channel().transmits, 2);
    assert_eq!(ctx.transport.channel().resets, 1);
}

#[test]
fn test_script_sums_children() {
    let description: jcbench::CaseDescription = serde_json::from_str(
        r#"{
            "name": "script",
            "round": 1,
            "result": "identity",
            "unit": "S",
            "setup": "Reset",
            "teardown": "Reset",
            "adjust": "Reset",
            "test": ["Select a000000151000000", "Select a000000151000000"]
        }"#,
    )
    .unwrap();
    let case = MeasureCase::from_description(Path::new("script.json"), description).unwrap();

    // the two scripted transmits take 40 ms together; adjust is a reset
    // with negligible wall-clock cost
    let channel = TimedChannel::new(&[15, 25]);
    let mut ctx = Context::new(channel);
    case.run(&mut ctx);

    let rows = ctx.reporter.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, "0.04 S");
}
