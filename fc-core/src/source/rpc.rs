//! Inter-process bus temperature source
//!
//! Each poll is one `object.method` call with a JSON object of arguments.
//! The reply is searched for the configured key and its value converted to
//! milli-Celsius. Replies may carry raw integers, fractional Celsius, or
//! unit-tagged text such as `"42.5 C"` or `"42500 mC"`.
//!
//! # Unit rules
//!
//! 1. Text with an explicit unit wins: `mC`/`millic...` as-is, `C`/`°C`/`celsius` x1000
//! 2. Key containing `mc` or `millic`: as-is
//! 3. Fractional number: Celsius, x1000
//! 4. Key containing `temp` and a magnitude below 1000: Celsius, x1000
//! 5. Anything else is taken as milli-Celsius

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{clamp_poll_interval, SnapshotCell, SourceSnapshot, TempSample, TempSource};
use crate::constants::source::{MAX_RPC_TIMEOUT, MIN_RPC_TIMEOUT, RPC_PROGRAM, RPC_WAIT_STEP};
use fc_error::{FanControlError, Result};

/// One blocking remote call
#[cfg_attr(test, mockall::automock)]
pub trait RpcTransport: Send + Sync {
    /// Call `object.method` with `args`, returning the parsed JSON reply
    fn call(&self, object: &str, method: &str, args: &Value, timeout: Duration) -> Result<Value>;
}

/// Transport that runs the bus command-line client
#[derive(Debug, Clone)]
pub struct UbusCli {
    program: String,
}

impl Default for UbusCli {
    fn default() -> Self {
        Self {
            program: RPC_PROGRAM.to_string(),
        }
    }
}

impl UbusCli {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl RpcTransport for UbusCli {
    fn call(&self, object: &str, method: &str, args: &Value, timeout: Duration) -> Result<Value> {
        let target = format!("{}.{}", object, method);
        let secs = timeout.as_secs().max(1);

        let mut child = Command::new(&self.program)
            .arg("-t")
            .arg(secs.to_string())
            .arg("call")
            .arg(object)
            .arg(method)
            .arg(args.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FanControlError::rpc(&target, format!("cannot run {}: {}", self.program, e)))?;

        // Drain stdout while waiting so a large reply cannot fill the pipe
        let reader = spawn_reader(&mut child, &target)?;
        let deadline = Instant::now() + timeout;
        let timed_out = || {
            FanControlError::Timeout(format!("{} did not answer within {}s", target, secs))
        };

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(timed_out());
                }
                Ok(None) => thread::sleep(RPC_WAIT_STEP),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(FanControlError::rpc(&target, e.to_string()));
                }
            }
        };

        if !status.success() {
            return Err(FanControlError::rpc(&target, format!("exited with {}", status)));
        }

        // A grandchild may still hold the pipe open; the deadline bounds the wait
        let remaining = deadline.saturating_duration_since(Instant::now());
        let output = match reader.recv_timeout(remaining.max(RPC_WAIT_STEP)) {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(FanControlError::rpc(&target, e.to_string())),
            Err(RecvTimeoutError::Timeout) => return Err(timed_out()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(FanControlError::rpc(&target, "reply reader stopped"))
            }
        };
        if output.trim().is_empty() {
            return Err(FanControlError::rpc(&target, "empty reply"));
        }
        Ok(serde_json::from_str(&output)?)
    }
}

/// Read the child's stdout to the end on a helper thread
fn spawn_reader(child: &mut Child, target: &str) -> Result<Receiver<std::io::Result<String>>> {
    let mut stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FanControlError::rpc(target, "stdout not captured"));
        }
    };

    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("fc-rpc-reply".to_string())
        .spawn(move || {
            let mut output = String::new();
            let result = stdout.read_to_string(&mut output).map(|_| output);
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        let _ = child.kill();
        let _ = child.wait();
        return Err(FanControlError::rpc(target, format!("cannot start reply reader: {}", e)));
    }
    Ok(rx)
}

/// Temperature read from a remote method reply
pub struct RpcSource {
    id: String,
    object: String,
    method: String,
    key: String,
    /// Parsed once; a malformed argument text fails every poll of this source only
    args: std::result::Result<Value, String>,
    poll_interval: Duration,
    timeout: Duration,
    transport: Box<dyn RpcTransport>,
    cell: SnapshotCell,
}

impl RpcSource {
    pub fn new(
        id: &str,
        object: &str,
        method: &str,
        key: &str,
        args_json: &str,
        poll_sec: u32,
        transport: Box<dyn RpcTransport>,
    ) -> Self {
        let poll_interval = clamp_poll_interval(poll_sec);
        Self {
            id: id.to_string(),
            object: object.to_string(),
            method: method.to_string(),
            key: key.to_string(),
            args: parse_args(args_json),
            poll_interval,
            timeout: poll_interval.clamp(MIN_RPC_TIMEOUT, MAX_RPC_TIMEOUT),
            transport,
            cell: SnapshotCell::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn target(&self) -> String {
        format!("{}.{}", self.object, self.method)
    }

    fn read_temperature(&self) -> Result<i32> {
        let args = self
            .args
            .as_ref()
            .map_err(|e| FanControlError::rpc(self.target(), e.clone()))?;
        let reply = self
            .transport
            .call(&self.object, &self.method, args, self.timeout)?;

        find_key(&reply, &self.key)
            .and_then(|value| to_millicelsius(&self.key, value))
            .ok_or_else(|| FanControlError::RpcReplyField {
                target: self.target(),
                key: self.key.clone(),
            })
    }
}

impl TempSource for RpcSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn sample(&self) {
        let now = Instant::now();
        match self.read_temperature() {
            Ok(temp_mc) => self.cell.store(TempSample::good(temp_mc, now)),
            Err(e) => {
                debug!(source = %self.id, "{}", e);
                self.cell.store(TempSample::failed(e.to_string(), now));
            }
        }
    }

    fn publish_failure(&self, error: &str) {
        self.cell.store(TempSample::failed(error, Instant::now()));
    }

    fn snapshot(&self) -> SourceSnapshot {
        self.cell.load()
    }
}

fn parse_args(text: &str) -> std::result::Result<Value, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(text) {
        Ok(v) if v.is_object() => Ok(v),
        Ok(_) => Err("arguments must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON arguments: {}", e)),
    }
}

/// Depth-first search for the first field named `key`
fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|v| find_key(v, key))),
        Value::Array(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    MilliCelsius,
    Celsius,
    Unknown,
}

fn tagged_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([+-]?[0-9]+(?:\.[0-9]+)?)\s*(.*)$").expect("tagged number pattern is valid")
    })
}

fn unit_from_tag(tag: &str) -> Option<Unit> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        return Some(Unit::Unknown);
    }
    if tag == "mc" || tag == "m°c" || tag.contains("millic") {
        return Some(Unit::MilliCelsius);
    }
    match tag.as_str() {
        "c" | "°c" | "degc" | "celsius" => Some(Unit::Celsius),
        _ => None,
    }
}

/// Convert a reply value to milli-Celsius.
///
/// A `temp` key only implies Celsius below 1000, so raw millidegree counts
/// under such keys are not scaled twice.
fn to_millicelsius(key: &str, value: &Value) -> Option<i32> {
    let (number, tagged) = match value {
        Value::Number(n) => (n.as_f64()?, Unit::Unknown),
        Value::String(s) => {
            let caps = tagged_number_regex().captures(s.trim())?;
            let number = caps.get(1)?.as_str().parse::<f64>().ok()?;
            let unit = unit_from_tag(caps.get(2).map_or("", |m| m.as_str()))?;
            (number, unit)
        }
        _ => return None,
    };

    let key = key.to_lowercase();
    let unit = match tagged {
        Unit::Unknown if key.contains("mc") || key.contains("millic") => Unit::MilliCelsius,
        Unit::Unknown if number.fract() != 0.0 => Unit::Celsius,
        Unit::Unknown if key.contains("temp") && number.abs() < 1000.0 => Unit::Celsius,
        Unit::Unknown => Unit::MilliCelsius,
        known => known,
    };

    let mc = match unit {
        Unit::Celsius => (number * 1000.0).round(),
        _ => number.round(),
    };
    if mc < f64::from(i32::MIN) || mc > f64::from(i32::MAX) {
        return None;
    }
    Some(mc as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;

    fn source_with(mock: MockRpcTransport, key: &str, args: &str, poll: u32) -> RpcSource {
        RpcSource::new("modem", "qmodem", "get_temperature", key, args, poll, Box::new(mock))
    }

    #[test]
    fn test_unit_sniffing() {
        assert_eq!(to_millicelsius("temp_mC", &json!(42500)), Some(42_500));
        assert_eq!(to_millicelsius("value", &json!("42.5 C")), Some(42_500));
        assert_eq!(to_millicelsius("value", &json!("42500 mC")), Some(42_500));
        assert_eq!(to_millicelsius("value", &json!("41°C")), Some(41_000));
        assert_eq!(to_millicelsius("value", &json!(42.5)), Some(42_500));
        assert_eq!(to_millicelsius("temperature", &json!(43)), Some(43_000));
        assert_eq!(to_millicelsius("temperature", &json!(43000)), Some(43_000));
        assert_eq!(to_millicelsius("value", &json!(39000)), Some(39_000));
        assert_eq!(to_millicelsius("temp_millicelsius", &json!("51000")), Some(51_000));
        assert_eq!(to_millicelsius("value", &json!("hot")), None);
        assert_eq!(to_millicelsius("value", &json!("40 K")), None);
        assert_eq!(to_millicelsius("value", &json!(true)), None);
    }

    #[test]
    fn test_find_key_nested() {
        let reply = json!({"modem": {"info": [{"name": "x"}, {"temp": "47 C"}]}});
        assert_eq!(find_key(&reply, "temp"), Some(&json!("47 C")));
        assert_eq!(find_key(&reply, "missing"), None);
    }

    #[test]
    fn test_sample_success_passes_args_and_timeout() {
        let mut mock = MockRpcTransport::new();
        mock.expect_call()
            .withf(|object, method, args, timeout| {
                object == "qmodem"
                    && method == "get_temperature"
                    && args == &json!({"config_section": "2_1"})
                    && *timeout == Duration::from_secs(10)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(json!({"temp_mC": 51000})));

        let src = source_with(mock, "temp_mC", r#"{"config_section":"2_1"}"#, 30);
        src.sample();
        assert_eq!(src.snapshot().last_good_sample.unwrap().temp_mc, 51_000);
    }

    #[test]
    fn test_timeout_follows_poll_interval() {
        let src = source_with(MockRpcTransport::new(), "t", "{}", 3);
        assert_eq!(src.timeout(), Duration::from_secs(3));
        let src = source_with(MockRpcTransport::new(), "t", "{}", 0);
        assert_eq!(src.poll_interval(), Duration::from_secs(1));
        assert_eq!(src.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_missing_field_is_failed_sample() {
        let mut mock = MockRpcTransport::new();
        mock.expect_call()
            .returning(|_, _, _, _| Ok(json!({"other": 1})));

        let src = source_with(mock, "temp_mC", "{}", 1);
        src.sample();
        let last = src.snapshot().last_sample.unwrap();
        assert!(!last.ok);
        assert!(last.error.contains("temp_mC"), "{}", last.error);
    }

    #[test]
    fn test_transport_error_is_failed_sample() {
        let mut mock = MockRpcTransport::new();
        mock.expect_call()
            .returning(|_, _, _, _| Err(FanControlError::Timeout("qmodem.get_temperature".into())));

        let src = source_with(mock, "temp_mC", "{}", 1);
        src.sample();
        let snap = src.snapshot();
        assert!(snap.has_polled);
        assert!(snap.last_good_sample.is_none());
        assert!(snap.last_sample.unwrap().error.contains("timed out"));
    }

    #[test]
    fn test_malformed_args_never_call_transport() {
        let mut mock = MockRpcTransport::new();
        mock.expect_call().times(0);

        let src = source_with(mock, "temp_mC", "{not json", 1);
        src.sample();
        src.sample();
        let last = src.snapshot().last_sample.unwrap();
        assert!(!last.ok);
        assert!(last.error.contains("invalid JSON arguments"), "{}", last.error);
    }

    #[cfg(unix)]
    fn fake_client(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ubus");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    #[serial]
    fn test_cli_transport_parses_reply() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = fake_client(dir.path(), r#"echo '{"temp": "44.5 C"}'"#);

        let reply = UbusCli::with_program(program)
            .call("obj", "m", &json!({}), Duration::from_secs(2))
            .unwrap();
        assert_eq!(reply["temp"], "44.5 C");
    }

    #[test]
    #[serial]
    fn test_cli_transport_times_out() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = fake_client(dir.path(), "sleep 5");

        let start = Instant::now();
        let err = UbusCli::with_program(program)
            .call("obj", "m", &json!({}), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, FanControlError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    #[serial]
    fn test_cli_transport_reads_reply_larger_than_pipe() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = fake_client(
            dir.path(),
            r#"printf '{"pad": "'; head -c 100000 /dev/zero | tr '\0' a; printf '", "temp": "45 C"}\n'"#,
        );

        let start = Instant::now();
        let reply = UbusCli::with_program(program)
            .call("obj", "m", &json!({}), Duration::from_secs(2))
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(reply["temp"], "45 C");
        assert_eq!(reply["pad"].as_str().unwrap().len(), 100_000);
    }

    #[test]
    fn test_cli_transport_missing_program() {
        let err = UbusCli::with_program("/nonexistent/ubus")
            .call("obj", "m", &json!({}), Duration::from_secs(1))
            .unwrap_err();
        assert!(err.to_string().contains("cannot run"));
    }
}
