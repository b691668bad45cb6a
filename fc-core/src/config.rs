//! Board configuration
//!
//! The control core treats a [`BoardConfig`] as validated and immutable for
//! the whole run. This module owns loading it from the `KEY=VALUE` text file,
//! validating every invariant the core relies on, and rendering it back.
//!
//! # File format
//!
//! ```text
//! INTERVAL=1
//! CONTROL_MODE=user
//! PWM_PATH=/sys/class/hwmon/hwmon2/pwm1
//! SOURCE_soc=type=sysfs,path=/sys/class/thermal/thermal_zone0/temp,t_start=60000
//! SOURCE_modem=type=rpc,object=qmodem,method=get_temperature,key=temp_mC,args={"config_section":"2_1"},poll=10
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::constants::{defaults, paths, pwm, source as source_const};
use fc_error::{FanControlError, Result};

/// Who owns the PWM register while the daemon runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// The platform keeps the register; the daemon only monitors
    Kernel,
    /// The daemon takes the register over for the duration of the run
    User,
}

impl ControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::Kernel => "kernel",
            ControlMode::User => "user",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "kernel" => Ok(ControlMode::Kernel),
            "user" => Ok(ControlMode::User),
            other => Err(FanControlError::invalid_config(
                "CONTROL_MODE",
                format!("must be one of: kernel, user (got '{}')", other),
            )),
        }
    }
}

/// Where a source reads its temperature from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceLocation {
    /// Local file holding an integer milli-Celsius value
    Sysfs { path: PathBuf },
    /// Remote method on the inter-process bus
    Rpc {
        object: String,
        method: String,
        key: String,
        /// Canonical JSON object text passed as call arguments
        args: String,
    },
}

impl SourceLocation {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceLocation::Sysfs { .. } => "sysfs",
            SourceLocation::Rpc { .. } => "rpc",
        }
    }
}

/// Identity and policy constants for one temperature channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardSourceConfig {
    pub id: String,
    #[serde(flatten)]
    pub location: SourceLocation,
    #[serde(rename = "t_start")]
    pub t_start_mc: i32,
    #[serde(rename = "t_full")]
    pub t_full_mc: i32,
    #[serde(rename = "t_crit")]
    pub t_crit_mc: i32,
    #[serde(rename = "ttl")]
    pub ttl_sec: u32,
    #[serde(rename = "poll")]
    pub poll_sec: u32,
    /// Percentage scaling of this channel's demand
    pub weight: i32,
}

impl BoardSourceConfig {
    /// Key identifying the physical resource behind this source
    pub fn resource_key(&self) -> String {
        match &self.location {
            SourceLocation::Sysfs { path } => format!("sysfs:{}", path.display()),
            SourceLocation::Rpc {
                object,
                method,
                key,
                args,
            } => format!("rpc:{}|{}|{}|{}", object, method, key, args),
        }
    }
}

/// Global board configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardConfig {
    #[serde(rename = "interval")]
    pub interval_sec: u32,
    pub control_mode: ControlMode,
    pub pwm_path: PathBuf,
    pub pwm_enable_path: PathBuf,
    pub control_mode_path: PathBuf,
    pub pwm_min: i32,
    pub pwm_max: i32,
    /// Lower register values mean stronger cooling
    pub pwm_inverted: bool,
    /// Spin-up value; negative disables the boost
    pub pwm_startup: i32,
    #[serde(rename = "ramp_up")]
    pub ramp_up_sec: u32,
    #[serde(rename = "ramp_down")]
    pub ramp_down_sec: u32,
    #[serde(rename = "hysteresis_mC")]
    pub hysteresis_mc: i32,
    pub failsafe_pwm: i32,
    pub sources: Vec<BoardSourceConfig>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            interval_sec: defaults::INTERVAL_SEC,
            control_mode: ControlMode::Kernel,
            pwm_path: PathBuf::from(paths::PWM),
            pwm_enable_path: PathBuf::from(paths::PWM_ENABLE),
            control_mode_path: PathBuf::from(paths::CONTROL_MODE),
            pwm_min: defaults::PWM_MIN,
            pwm_max: defaults::PWM_MAX,
            pwm_inverted: false,
            pwm_startup: defaults::PWM_STARTUP,
            ramp_up_sec: defaults::RAMP_UP_SEC,
            ramp_down_sec: defaults::RAMP_DOWN_SEC,
            hysteresis_mc: defaults::HYSTERESIS_MC,
            failsafe_pwm: defaults::FAILSAFE_PWM,
            sources: Vec::new(),
        }
    }
}

const TOP_LEVEL_KEYS: &[&str] = &[
    "INTERVAL",
    "CONTROL_MODE",
    "PWM_PATH",
    "PWM_ENABLE_PATH",
    "CONTROL_MODE_PATH",
    "PWM_MIN",
    "PWM_MAX",
    "PWM_INVERTED",
    "PWM_STARTUP",
    "RAMP_UP",
    "RAMP_DOWN",
    "HYSTERESIS_MC",
    "FAILSAFE_PWM",
];

const SOURCE_COMMON_FIELDS: &[&str] = &["type", "t_start", "t_full", "t_crit", "ttl", "poll", "weight"];
const SOURCE_SYSFS_FIELDS: &[&str] = &["path"];
const SOURCE_RPC_FIELDS: &[&str] = &["object", "method", "key", "args"];

impl BoardConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| FanControlError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let cfg = Self::from_text(&text)?;
        debug!(
            "Loaded board config from {:?}: {} sources, mode {}",
            path,
            cfg.sources.len(),
            cfg.control_mode.as_str()
        );
        Ok(cfg)
    }

    /// Parse and validate configuration text
    pub fn from_text(text: &str) -> Result<Self> {
        let mut plain: HashMap<String, String> = HashMap::new();
        let mut source_lines: Vec<(String, String)> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_inline_comment(raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                FanControlError::config(format!("invalid config line {}: missing '='", line_no))
            })?;
            let key = key.trim();
            let value = value.trim();

            if let Some(id) = key.strip_prefix("SOURCE_").filter(|id| !id.is_empty()) {
                source_lines.push((id.to_string(), value.to_string()));
                continue;
            }
            if !TOP_LEVEL_KEYS.contains(&key) {
                return Err(FanControlError::config(format!(
                    "unknown top-level key at line {}: {}",
                    line_no, key
                )));
            }
            if plain.insert(key.to_string(), value.to_string()).is_some() {
                return Err(FanControlError::config(format!(
                    "duplicate top-level key at line {}: {}",
                    line_no, key
                )));
            }
        }

        let mut cfg = BoardConfig::default();
        if let Some(v) = plain.get("INTERVAL") {
            cfg.interval_sec = parse_u32(v, "INTERVAL")?;
        }
        if let Some(v) = plain.get("CONTROL_MODE") {
            cfg.control_mode = ControlMode::parse(v)?;
        }
        if let Some(v) = plain.get("PWM_PATH") {
            cfg.pwm_path = PathBuf::from(v);
            // A custom register gets its own enable file unless one is given
            cfg.pwm_enable_path = PathBuf::new();
        }
        if let Some(v) = plain.get("PWM_ENABLE_PATH") {
            cfg.pwm_enable_path = PathBuf::from(v);
        }
        if let Some(v) = plain.get("CONTROL_MODE_PATH") {
            cfg.control_mode_path = PathBuf::from(v);
        }
        if let Some(v) = plain.get("PWM_MIN") {
            cfg.pwm_min = parse_i32(v, "PWM_MIN")?;
        }
        if let Some(v) = plain.get("PWM_MAX") {
            cfg.pwm_max = parse_i32(v, "PWM_MAX")?;
        }
        if let Some(v) = plain.get("PWM_INVERTED") {
            cfg.pwm_inverted = parse_bool(v, "PWM_INVERTED")?;
        }
        if let Some(v) = plain.get("PWM_STARTUP") {
            cfg.pwm_startup = parse_i32(v, "PWM_STARTUP")?;
        }
        if let Some(v) = plain.get("RAMP_UP") {
            cfg.ramp_up_sec = parse_u32(v, "RAMP_UP")?;
        }
        if let Some(v) = plain.get("RAMP_DOWN") {
            cfg.ramp_down_sec = parse_u32(v, "RAMP_DOWN")?;
        }
        if let Some(v) = plain.get("HYSTERESIS_MC") {
            cfg.hysteresis_mc = parse_i32(v, "HYSTERESIS_MC")?;
        }
        if let Some(v) = plain.get("FAILSAFE_PWM") {
            cfg.failsafe_pwm = parse_i32(v, "FAILSAFE_PWM")?;
        }

        for (id, rhs) in &source_lines {
            let src = parse_source_line(id, rhs, cfg.interval_sec)?;
            cfg.sources.push(src);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate and normalize in place
    ///
    /// Normalization canonicalizes sysfs paths and RPC argument text, so the
    /// resource-uniqueness check compares like with like.
    pub fn validate(&mut self) -> Result<()> {
        if self.interval_sec < 1 {
            return Err(FanControlError::invalid_config("INTERVAL", "must be >= 1"));
        }
        if self.pwm_path.as_os_str().is_empty() {
            return Err(FanControlError::MissingConfig("PWM_PATH".into()));
        }
        if self.pwm_enable_path.as_os_str().is_empty() {
            let mut enable = self.pwm_path.clone().into_os_string();
            enable.push("_enable");
            self.pwm_enable_path = PathBuf::from(enable);
        }
        if self.control_mode_path.as_os_str().is_empty() {
            self.control_mode_path = PathBuf::from(paths::CONTROL_MODE);
        }

        ensure_range("PWM_MIN", self.pwm_min, pwm::MIN_VALUE, pwm::MAX_VALUE)?;
        ensure_range("PWM_MAX", self.pwm_max, pwm::MIN_VALUE, pwm::MAX_VALUE)?;
        if self.pwm_min > self.pwm_max {
            return Err(FanControlError::invalid_config("PWM_MIN", "must be <= PWM_MAX"));
        }
        ensure_range("FAILSAFE_PWM", self.failsafe_pwm, pwm::MIN_VALUE, pwm::MAX_VALUE)?;
        if self.pwm_startup > pwm::MAX_VALUE {
            return Err(FanControlError::invalid_config(
                "PWM_STARTUP",
                format!("must be <= {}", pwm::MAX_VALUE),
            ));
        }
        if self.ramp_up_sec < 1 {
            return Err(FanControlError::invalid_config("RAMP_UP", "must be >= 1"));
        }
        if self.ramp_down_sec < 1 {
            return Err(FanControlError::invalid_config("RAMP_DOWN", "must be >= 1"));
        }
        if self.hysteresis_mc < 0 {
            return Err(FanControlError::invalid_config("HYSTERESIS_MC", "must be >= 0"));
        }

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut resource_owner: HashMap<String, String> = HashMap::new();

        for src in &mut self.sources {
            src.id = src.id.trim().to_string();
            if !is_valid_source_id(&src.id) {
                return Err(FanControlError::config(format!(
                    "invalid SOURCE id: {} (expected pattern {})",
                    src.id,
                    source_const::ID_PATTERN
                )));
            }
            if !seen_ids.insert(src.id.clone()) {
                return Err(FanControlError::config(format!("duplicate SOURCE id: {}", src.id)));
            }
            validate_source(src)?;

            let resource = src.resource_key();
            if let Some(owner) = resource_owner.get(&resource) {
                return Err(FanControlError::config(format!(
                    "duplicate source resource: SOURCE_{} conflicts with SOURCE_{}",
                    src.id, owner
                )));
            }
            resource_owner.insert(resource, src.id.clone());
        }

        if self.sources.is_empty() {
            return Err(FanControlError::config("no SOURCE_* entries found in board config"));
        }
        Ok(())
    }

    /// Look up a source by id
    pub fn source(&self, id: &str) -> Option<&BoardSourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Render back into the text format accepted by [`BoardConfig::from_text`]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("# Configuration file generated by fancontrol\n");
        let _ = writeln!(out, "INTERVAL={}", self.interval_sec);
        let _ = writeln!(out, "CONTROL_MODE={}", self.control_mode.as_str());
        let _ = writeln!(out, "PWM_PATH={}", self.pwm_path.display());
        let _ = writeln!(out, "PWM_ENABLE_PATH={}", self.pwm_enable_path.display());
        let _ = writeln!(out, "CONTROL_MODE_PATH={}", self.control_mode_path.display());
        let _ = writeln!(out, "PWM_MIN={}", self.pwm_min);
        let _ = writeln!(out, "PWM_MAX={}", self.pwm_max);
        let _ = writeln!(out, "PWM_INVERTED={}", u8::from(self.pwm_inverted));
        let _ = writeln!(out, "PWM_STARTUP={}", self.pwm_startup);
        let _ = writeln!(out, "RAMP_UP={}", self.ramp_up_sec);
        let _ = writeln!(out, "RAMP_DOWN={}", self.ramp_down_sec);
        let _ = writeln!(out, "HYSTERESIS_MC={}", self.hysteresis_mc);
        let _ = writeln!(out, "FAILSAFE_PWM={}", self.failsafe_pwm);

        for src in &self.sources {
            let _ = write!(out, "SOURCE_{}=type={}", src.id, src.location.kind());
            match &src.location {
                SourceLocation::Sysfs { path } => {
                    let _ = write!(out, ",path={}", path.display());
                }
                SourceLocation::Rpc {
                    object,
                    method,
                    key,
                    args,
                } => {
                    let _ = write!(
                        out,
                        ",object={},method={},key={},args={}",
                        object, method, key, args
                    );
                }
            }
            let _ = writeln!(
                out,
                ",t_start={},t_full={},t_crit={},ttl={},poll={},weight={}",
                src.t_start_mc, src.t_full_mc, src.t_crit_mc, src.ttl_sec, src.poll_sec, src.weight
            );
        }
        out
    }
}

fn validate_source(src: &mut BoardSourceConfig) -> Result<()> {
    let prefix = format!("SOURCE_{}", src.id);

    if src.poll_sec < 1 {
        return Err(FanControlError::invalid_config(&prefix, "poll must be >= 1"));
    }
    if src.ttl_sec < 1 {
        return Err(FanControlError::invalid_config(&prefix, "ttl must be >= 1"));
    }
    if src.ttl_sec < src.poll_sec {
        return Err(FanControlError::invalid_config(&prefix, "ttl must be >= poll"));
    }
    if !(source_const::MIN_WEIGHT..=source_const::MAX_WEIGHT).contains(&src.weight) {
        return Err(FanControlError::invalid_config(
            &prefix,
            format!(
                "weight must be in range [{}, {}]",
                source_const::MIN_WEIGHT,
                source_const::MAX_WEIGHT
            ),
        ));
    }
    for (name, value) in [
        ("t_start", src.t_start_mc),
        ("t_full", src.t_full_mc),
        ("t_crit", src.t_crit_mc),
    ] {
        if !(source_const::MIN_THRESHOLD_MC..=source_const::MAX_THRESHOLD_MC).contains(&value) {
            return Err(FanControlError::invalid_config(
                &prefix,
                format!("{} out of allowed range", name),
            ));
        }
    }
    if !(src.t_start_mc < src.t_full_mc && src.t_full_mc <= src.t_crit_mc) {
        return Err(FanControlError::invalid_config(
            &prefix,
            "thermal thresholds must satisfy t_start < t_full <= t_crit",
        ));
    }

    match &mut src.location {
        SourceLocation::Sysfs { path } => {
            let canonical = canonicalize_path_text(path);
            if !canonical.is_absolute() {
                return Err(FanControlError::invalid_config(
                    &prefix,
                    "path must be an absolute sysfs path",
                ));
            }
            *path = canonical;
        }
        SourceLocation::Rpc {
            object,
            method,
            key,
            args,
        } => {
            *object = object.trim().to_string();
            *method = method.trim().to_string();
            *key = key.trim().to_string();
            if object.is_empty() || method.is_empty() || key.is_empty() {
                return Err(FanControlError::MissingConfig(format!(
                    "{} object, method and key",
                    prefix
                )));
            }
            *args = canonicalize_json_object_text(args, &prefix)?;
        }
    }
    Ok(())
}

fn parse_source_line(id: &str, rhs: &str, fallback_poll_sec: u32) -> Result<BoardSourceConfig> {
    let prefix = format!("SOURCE_{}", id.trim());
    let fields = split_fields(rhs)?;

    let kind = fields
        .get("type")
        .map(|t| t.trim().to_ascii_lowercase())
        .ok_or_else(|| FanControlError::MissingConfig(format!("{} type", prefix)))?;
    let type_fields: &[&str] = match kind.as_str() {
        "sysfs" => SOURCE_SYSFS_FIELDS,
        "rpc" | "ubus" => SOURCE_RPC_FIELDS,
        other => {
            return Err(FanControlError::invalid_config(
                &prefix,
                format!("unsupported source type: {}", other),
            ))
        }
    };
    for field in fields.keys() {
        if !SOURCE_COMMON_FIELDS.contains(&field.as_str()) && !type_fields.contains(&field.as_str()) {
            return Err(FanControlError::config(format!(
                "unknown field for {}: {}",
                prefix, field
            )));
        }
    }

    let poll_sec = match fields.get("poll") {
        Some(v) => parse_u32(v, "poll")?,
        None => fallback_poll_sec,
    };
    let ttl_sec = match fields.get("ttl") {
        Some(v) => parse_u32(v, "ttl")?,
        None => poll_sec.max(fallback_poll_sec).saturating_mul(2),
    };
    let int_or = |name: &str, default: i32| -> Result<i32> {
        fields.get(name).map_or(Ok(default), |v| parse_i32(v, name))
    };

    let location = if kind == "sysfs" {
        SourceLocation::Sysfs {
            path: PathBuf::from(fields.get("path").map(|p| p.trim()).unwrap_or_default()),
        }
    } else {
        let text = |name: &str| fields.get(name).map(|v| v.trim().to_string()).unwrap_or_default();
        let args = text("args");
        SourceLocation::Rpc {
            object: text("object"),
            method: text("method"),
            key: text("key"),
            args: if args.is_empty() { "{}".to_string() } else { args },
        }
    };

    Ok(BoardSourceConfig {
        id: id.trim().to_string(),
        location,
        t_start_mc: int_or("t_start", defaults::T_START_MC)?,
        t_full_mc: int_or("t_full", defaults::T_FULL_MC)?,
        t_crit_mc: int_or("t_crit", defaults::T_CRIT_MC)?,
        ttl_sec,
        poll_sec,
        weight: int_or("weight", defaults::WEIGHT)?,
    })
}

fn source_id_regex() -> &'static Regex {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    ID_RE.get_or_init(|| Regex::new(source_const::ID_PATTERN).expect("source id pattern is valid"))
}

/// Source ids are `[A-Za-z0-9_-]+`
pub fn is_valid_source_id(id: &str) -> bool {
    source_id_regex().is_match(id)
}

fn parse_i64(value: &str, name: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| FanControlError::invalid_config(name, format!("invalid integer: {}", value)))
}

fn parse_i32(value: &str, name: &str) -> Result<i32> {
    let v = parse_i64(value, name)?;
    i32::try_from(v).map_err(|_| FanControlError::invalid_config(name, format!("out of range: {}", v)))
}

fn parse_u32(value: &str, name: &str) -> Result<u32> {
    let v = parse_i64(value, name)?;
    if v < 1 {
        return Err(FanControlError::invalid_config(name, "must be >= 1"));
    }
    u32::try_from(v).map_err(|_| FanControlError::invalid_config(name, format!("out of range: {}", v)))
}

fn parse_bool(value: &str, name: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(FanControlError::invalid_config(
            name,
            format!("expected 0 or 1, got '{}'", other),
        )),
    }
}

fn ensure_range(name: &str, value: i32, min: i32, max: i32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(FanControlError::invalid_config(
            name,
            format!("must be in range [{}, {}]", min, max),
        ))
    }
}

/// Tracks quoting and bracket nesting while scanning a config value
#[derive(Default)]
struct Nesting {
    braces: u32,
    brackets: u32,
    quote: Option<char>,
    escape: bool,
}

impl Nesting {
    /// Feed one character; returns true if it is outside quotes and brackets
    fn feed(&mut self, ch: char) -> bool {
        if let Some(q) = self.quote {
            if self.escape {
                self.escape = false;
            } else if ch == '\\' {
                self.escape = true;
            } else if ch == q {
                self.quote = None;
            }
            return false;
        }
        match ch {
            '"' | '\'' => {
                self.quote = Some(ch);
                return false;
            }
            '{' => self.braces += 1,
            '}' => self.braces = self.braces.saturating_sub(1),
            '[' => self.brackets += 1,
            ']' => self.brackets = self.brackets.saturating_sub(1),
            _ => {}
        }
        self.braces == 0 && self.brackets == 0
    }
}

fn strip_inline_comment(line: &str) -> String {
    let mut nesting = Nesting::default();
    let mut out = String::with_capacity(line.len());
    for ch in line.chars() {
        if nesting.feed(ch) && ch == '#' {
            break;
        }
        out.push(ch);
    }
    out
}

/// Split `k=v,k=v` where commas inside JSON values do not separate fields
fn split_fields(value: &str) -> Result<HashMap<String, String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut nesting = Nesting::default();

    for ch in value.chars() {
        if nesting.feed(ch) && ch == ',' {
            tokens.push(std::mem::take(&mut current));
            continue;
        }
        current.push(ch);
    }
    tokens.push(current);

    let mut fields = HashMap::new();
    for token in tokens.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        let (k, v) = token
            .split_once('=')
            .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
            .ok_or_else(|| FanControlError::config(format!("bad source token: {}", token)))?;
        if fields.insert(k.trim().to_string(), v.trim().to_string()).is_some() {
            return Err(FanControlError::config(format!("duplicate source field: {}", k.trim())));
        }
    }
    Ok(fields)
}

/// Lexically normalize a path: drop `.`, resolve `..`, collapse separators
fn canonicalize_path_text(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir => out.push("/"),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            Component::Normal(seg) => out.push(seg),
            Component::Prefix(_) => {}
        }
    }
    out
}

fn canonicalize_json_object_text(text: &str, name: &str) -> Result<String> {
    let parsed: serde_json::Value = serde_json::from_str(text.trim()).map_err(|e| {
        FanControlError::invalid_config(name, format!("invalid JSON for args: {}", e))
    })?;
    if !parsed.is_object() {
        return Err(FanControlError::invalid_config(name, "args must be a JSON object"));
    }
    Ok(parsed.to_string())
}
