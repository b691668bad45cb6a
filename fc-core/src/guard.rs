//! Ownership guards
//!
//! Startup takes four resources in a fixed order and shutdown gives them back
//! in exactly the reverse order:
//!
//! 1. Instance lock: exclusive `flock` on the lock file
//! 2. PID file recording this process
//! 3. Control handover (user mode only): control-mode token, PWM enable and
//!    PWM register saved, then taken over
//! 4. Status file, removed on release
//!
//! Each guard releases itself on drop and [`GuardStack`] drops them LIFO, so
//! a failed acquisition unwinds only what was already taken. A release that
//! fails is logged and never stops the remaining ones.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{BoardConfig, ControlMode};
use crate::constants::{control_mode, paths, pwm};
use crate::engine::demand::full_pwm;
use crate::hw::control::{
    check_readable, check_writable, read_int, read_pwm_value, read_token, set_pwm_value,
    write_int, write_token,
};
use crate::status::temp_path;
use fc_error::{FanControlError, Result};

/// Lifecycle file locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub lock_file: PathBuf,
    pub pid_file: PathBuf,
    pub status_file: PathBuf,
}

impl Default for RuntimePaths {
    fn default() -> Self {
        Self {
            lock_file: PathBuf::from(paths::LOCK_FILE),
            pid_file: PathBuf::from(paths::PID_FILE),
            status_file: PathBuf::from(paths::STATUS_FILE),
        }
    }
}

/// Verify hardware files before anything is taken over
pub fn check_hardware_access(cfg: &BoardConfig) -> Result<()> {
    match cfg.control_mode {
        ControlMode::User => {
            check_writable(&cfg.pwm_path)?;
            if cfg.pwm_enable_path.exists() {
                check_writable(&cfg.pwm_enable_path)?;
            }
            check_writable(&cfg.control_mode_path)?;
        }
        ControlMode::Kernel => check_readable(&cfg.pwm_path)?,
    }
    Ok(())
}

fn read_pid(path: &Path) -> Option<i32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .filter(|pid| *pid > 0)
}

fn pid_is_alive(pid: i32) -> bool {
    // SAFETY: kill with signal 0 only checks that the process exists.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Exclusive advisory lock held for the life of the process
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    file: File,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        // A releasing holder unlinks the file while still locking it; retry
        // when the locked inode is no longer the one at `path`.
        for _ in 0..LOCK_ATTEMPTS {
            let mut file = open_and_lock(path)?;
            if !locks_current_file(&file, path) {
                debug!("Lock file {:?} was replaced while locking, retrying", path);
                continue;
            }

            file.set_len(0)
                .and_then(|_| writeln!(file, "{}", std::process::id()))
                .map_err(|e| FanControlError::FileWrite {
                    path: path.to_path_buf(),
                    source: e,
                })?;

            info!("Acquired instance lock {:?}", path);
            return Ok(Self {
                path: path.to_path_buf(),
                file,
            });
        }

        Err(FanControlError::InstanceLocked {
            path: path.to_path_buf(),
            holder: read_pid(path),
        })
    }
}

const LOCK_ATTEMPTS: usize = 3;

fn open_and_lock(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(0o644)
        .open(path)
        .map_err(|e| FanControlError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;

    // SAFETY: the descriptor belongs to `file`, which is alive for the call.
    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Err(FanControlError::InstanceLocked {
                path: path.to_path_buf(),
                holder: read_pid(path),
            });
        }
        return Err(FanControlError::FileWrite {
            path: path.to_path_buf(),
            source: err,
        });
    }
    Ok(file)
}

/// Whether `file` is still the inode linked at `path`
fn locks_current_file(file: &File, path: &Path) -> bool {
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(linked)) => held.dev() == linked.dev() && held.ino() == linked.ino(),
        _ => false,
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = remove_if_present(&self.path) {
            warn!("Failed to remove lock file {:?}: {}", self.path, e);
        }
        // SAFETY: the descriptor is still owned by self.file.
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        debug!("Released instance lock {:?}", self.path);
    }
}

/// PID file of the running instance
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create the PID file, clearing a stale one left by a dead process
    pub fn acquire(path: &Path) -> Result<Self> {
        if path.exists() {
            if let Some(pid) = read_pid(path) {
                if pid_is_alive(pid) {
                    return Err(FanControlError::AlreadyRunning {
                        path: path.to_path_buf(),
                        pid,
                    });
                }
                info!("Removing stale PID file {:?} (process {} is gone)", path, pid);
            }
            remove_if_present(path).map_err(|e| FanControlError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let write_err = |e| FanControlError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(path)
            .map_err(write_err)?;
        writeln!(file, "{}", std::process::id()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;

        debug!("PID file written: {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match remove_if_present(&self.path) {
            Ok(()) => debug!("Removed PID file {:?}", self.path),
            Err(e) => warn!("Failed to remove PID file {:?}: {}", self.path, e),
        }
    }
}

/// PWM ownership taken from the platform for the duration of the run
///
/// Only the steps that actually happened are reverted, so a takeover that
/// fails half way restores exactly what it touched.
#[derive(Debug)]
pub struct ControlHandover {
    pwm_path: PathBuf,
    enable_path: PathBuf,
    mode_path: PathBuf,
    full_pwm: i32,
    previous_mode: Option<String>,
    original_pwm: Option<i32>,
    original_enable: Option<i32>,
    mode_taken: bool,
    enable_taken: bool,
    pwm_taken: bool,
}

impl ControlHandover {
    pub fn acquire(cfg: &BoardConfig) -> Result<Self> {
        let mut handover = Self {
            pwm_path: cfg.pwm_path.clone(),
            enable_path: cfg.pwm_enable_path.clone(),
            mode_path: cfg.control_mode_path.clone(),
            full_pwm: full_pwm(cfg),
            previous_mode: None,
            original_pwm: None,
            original_enable: None,
            mode_taken: false,
            enable_taken: false,
            pwm_taken: false,
        };

        handover.previous_mode = read_token(&handover.mode_path).ok();
        handover.mode_taken = true;
        write_token(&handover.mode_path, control_mode::USER_TOKEN).map_err(|e| {
            FanControlError::ControlMode {
                path: handover.mode_path.clone(),
                reason: e.to_string(),
            }
        })?;

        handover.original_pwm = read_pwm_value(&handover.pwm_path).ok();
        if let Some(orig) = handover.original_pwm {
            debug!("Saving {:?} original value as {}", handover.pwm_path, orig);
        }

        if handover.enable_path.exists() {
            handover.original_enable = read_int(&handover.enable_path).ok();
            handover.enable_taken = true;
            write_int(&handover.enable_path, pwm::enable::MANUAL)?;
        }

        handover.pwm_taken = true;
        set_pwm_value(&handover.pwm_path, handover.full_pwm)?;

        info!(
            "Took over {:?} (mode {:?} -> {}), starting at full cooling {}",
            handover.pwm_path,
            handover.previous_mode.as_deref().unwrap_or("?"),
            control_mode::USER_TOKEN,
            handover.full_pwm
        );
        Ok(handover)
    }
}

impl Drop for ControlHandover {
    fn drop(&mut self) {
        if self.pwm_taken {
            let value = self.original_pwm.unwrap_or(self.full_pwm);
            match set_pwm_value(&self.pwm_path, value) {
                Ok(()) => info!("Restored {:?} to {}", self.pwm_path, value),
                Err(e) => warn!("Failed to restore {:?}: {}", self.pwm_path, e),
            }
        }

        if self.enable_taken {
            if let Some(orig) = self.original_enable {
                if let Err(e) = write_int(&self.enable_path, orig) {
                    warn!("Failed to restore {:?} to {}: {}", self.enable_path, orig, e);
                }
            }
        }

        if self.mode_taken {
            let token = self
                .previous_mode
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(control_mode::KERNEL_TOKEN);
            match write_token(&self.mode_path, token) {
                Ok(()) => info!("Handed {:?} back as '{}'", self.mode_path, token),
                Err(e) => warn!("Failed to restore {:?} to '{}': {}", self.mode_path, token, e),
            }
        }
    }
}

/// Runtime status file, cleared at startup and removed on exit
#[derive(Debug)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn acquire(path: &Path) -> Result<Self> {
        for p in [path.to_path_buf(), temp_path(path)] {
            remove_if_present(&p).map_err(|e| FanControlError::FileWrite { path: p.clone(), source: e })?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StatusFile {
    fn drop(&mut self) {
        for p in [self.path.clone(), temp_path(&self.path)] {
            if let Err(e) = remove_if_present(&p) {
                warn!("Failed to remove status file {:?}: {}", p, e);
            }
        }
    }
}

/// One acquired resource
#[derive(Debug)]
pub enum OwnershipGuard {
    InstanceLock(InstanceLock),
    PidFile(PidFile),
    ControlHandover(ControlHandover),
    StatusFile(StatusFile),
}

impl OwnershipGuard {
    pub fn name(&self) -> &'static str {
        match self {
            OwnershipGuard::InstanceLock(_) => "instance lock",
            OwnershipGuard::PidFile(_) => "pid file",
            OwnershipGuard::ControlHandover(_) => "control handover",
            OwnershipGuard::StatusFile(_) => "status file",
        }
    }
}

/// Acquired guards, released in reverse order on drop
#[derive(Debug, Default)]
pub struct GuardStack {
    guards: Vec<OwnershipGuard>,
}

impl GuardStack {
    /// Take every guard in order; on failure the ones already held are released
    pub fn acquire(cfg: &BoardConfig, paths: &RuntimePaths) -> Result<Self> {
        let mut stack = GuardStack::default();

        stack.push(OwnershipGuard::InstanceLock(InstanceLock::acquire(&paths.lock_file)?));
        stack.push(OwnershipGuard::PidFile(PidFile::acquire(&paths.pid_file)?));
        if cfg.control_mode == ControlMode::User {
            stack.push(OwnershipGuard::ControlHandover(ControlHandover::acquire(cfg)?));
        }
        stack.push(OwnershipGuard::StatusFile(StatusFile::acquire(&paths.status_file)?));

        Ok(stack)
    }

    pub fn push(&mut self, guard: OwnershipGuard) {
        debug!("Acquired {}", guard.name());
        self.guards.push(guard);
    }

    /// True when this process holds the PWM register
    pub fn owns_pwm(&self) -> bool {
        self.guards
            .iter()
            .any(|g| matches!(g, OwnershipGuard::ControlHandover(_)))
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Release everything now, newest first
    pub fn release(&mut self) {
        while let Some(guard) = self.guards.pop() {
            debug!("Releasing {}", guard.name());
            drop(guard);
        }
    }
}

impl Drop for GuardStack {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoardSourceConfig, SourceLocation};
    use tempfile::TempDir;

    struct Board {
        dir: TempDir,
        cfg: BoardConfig,
        paths: RuntimePaths,
    }

    fn board(mode: ControlMode) -> Board {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("pwm1"), "77\n").unwrap();
        fs::write(root.join("pwm1_enable"), "2\n").unwrap();
        fs::write(root.join("mode"), "kernel\n").unwrap();

        let cfg = BoardConfig {
            control_mode: mode,
            pwm_path: root.join("pwm1"),
            pwm_enable_path: root.join("pwm1_enable"),
            control_mode_path: root.join("mode"),
            sources: vec![BoardSourceConfig {
                id: "soc".into(),
                location: SourceLocation::Sysfs {
                    path: root.join("temp"),
                },
                t_start_mc: 60_000,
                t_full_mc: 80_000,
                t_crit_mc: 90_000,
                ttl_sec: 4,
                poll_sec: 2,
                weight: 100,
            }],
            ..BoardConfig::default()
        };
        let paths = RuntimePaths {
            lock_file: root.join("fancontrol.lock"),
            pid_file: root.join("fancontrol.pid"),
            status_file: root.join("fancontrol.status.json"),
        };
        Board { dir, cfg, paths }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap().trim().to_string()
    }

    #[test]
    fn test_second_lock_names_holder() {
        let b = board(ControlMode::Kernel);
        let _first = InstanceLock::acquire(&b.paths.lock_file).unwrap();
        let err = InstanceLock::acquire(&b.paths.lock_file).unwrap_err();
        match err {
            FanControlError::InstanceLocked { holder, .. } => {
                assert_eq!(holder, Some(std::process::id() as i32));
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let b = board(ControlMode::Kernel);
        drop(InstanceLock::acquire(&b.paths.lock_file).unwrap());
        assert!(!b.paths.lock_file.exists());
        assert!(InstanceLock::acquire(&b.paths.lock_file).is_ok());
    }

    #[test]
    fn test_unlinked_lock_inode_is_detected() {
        let b = board(ControlMode::Kernel);
        let file = open_and_lock(&b.paths.lock_file).unwrap();
        assert!(locks_current_file(&file, &b.paths.lock_file));

        // A releasing holder unlinks; a newcomer creates a fresh file
        fs::remove_file(&b.paths.lock_file).unwrap();
        assert!(!locks_current_file(&file, &b.paths.lock_file));
        fs::write(&b.paths.lock_file, "").unwrap();
        assert!(!locks_current_file(&file, &b.paths.lock_file));

        // The fresh file is what acquire locks, not the stale inode
        let lock = InstanceLock::acquire(&b.paths.lock_file).unwrap();
        assert!(locks_current_file(&lock.file, &b.paths.lock_file));
        assert_eq!(read(&b.paths.lock_file), std::process::id().to_string());
    }

    #[test]
    fn test_stale_pid_file_replaced() {
        let b = board(ControlMode::Kernel);
        fs::write(&b.paths.pid_file, "2147483000\n").unwrap();

        let pid = PidFile::acquire(&b.paths.pid_file).unwrap();
        assert_eq!(read(&b.paths.pid_file), std::process::id().to_string());
        drop(pid);
        assert!(!b.paths.pid_file.exists());
    }

    #[test]
    fn test_live_pid_file_refused() {
        let b = board(ControlMode::Kernel);
        fs::write(&b.paths.pid_file, format!("{}\n", std::process::id())).unwrap();
        let err = PidFile::acquire(&b.paths.pid_file).unwrap_err();
        assert!(matches!(err, FanControlError::AlreadyRunning { .. }));
        // The other instance's file is left alone
        assert!(b.paths.pid_file.exists());
    }

    #[test]
    fn test_handover_takes_and_restores() {
        let b = board(ControlMode::User);
        let root = b.dir.path();

        let handover = ControlHandover::acquire(&b.cfg).unwrap();
        assert_eq!(read(&root.join("mode")), "user");
        assert_eq!(read(&root.join("pwm1_enable")), "1");
        assert_eq!(read(&root.join("pwm1")), "255");

        set_pwm_value(&root.join("pwm1"), 140).unwrap();
        drop(handover);
        assert_eq!(read(&root.join("pwm1")), "77");
        assert_eq!(read(&root.join("pwm1_enable")), "2");
        assert_eq!(read(&root.join("mode")), "kernel");
    }

    #[test]
    fn test_handover_unreadable_pwm_restores_full_cooling() {
        let b = board(ControlMode::User);
        let root = b.dir.path();
        fs::write(root.join("pwm1"), "garbage\n").unwrap();
        fs::remove_file(root.join("mode")).unwrap();

        drop(ControlHandover::acquire(&b.cfg).unwrap());
        assert_eq!(read(&root.join("pwm1")), "255");
        assert_eq!(read(&root.join("mode")), "kernel");
    }

    #[test]
    fn test_failed_handover_unwinds_what_it_touched() {
        let mut b = board(ControlMode::User);
        let root = b.dir.path().to_path_buf();
        // Writing a PWM value into a directory fails
        fs::create_dir(root.join("pwm_dir")).unwrap();
        b.cfg.pwm_path = root.join("pwm_dir");

        let err = ControlHandover::acquire(&b.cfg).unwrap_err();
        assert!(matches!(err, FanControlError::PwmWrite { .. }));
        assert_eq!(read(&root.join("mode")), "kernel");
        assert_eq!(read(&root.join("pwm1_enable")), "2");
    }

    #[test]
    fn test_stack_user_mode_lifecycle() {
        let b = board(ControlMode::User);
        fs::write(&b.paths.status_file, "{}").unwrap();

        let stack = GuardStack::acquire(&b.cfg, &b.paths).unwrap();
        assert_eq!(stack.len(), 4);
        assert!(stack.owns_pwm());
        assert!(b.paths.lock_file.exists());
        assert!(b.paths.pid_file.exists());
        assert!(!b.paths.status_file.exists());

        fs::write(&b.paths.status_file, "{}").unwrap();
        drop(stack);
        assert!(!b.paths.lock_file.exists());
        assert!(!b.paths.pid_file.exists());
        assert!(!b.paths.status_file.exists());
        assert_eq!(read(&b.dir.path().join("mode")), "kernel");
    }

    #[test]
    fn test_stack_kernel_mode_skips_handover() {
        let b = board(ControlMode::Kernel);
        let stack = GuardStack::acquire(&b.cfg, &b.paths).unwrap();
        assert_eq!(stack.len(), 3);
        assert!(!stack.owns_pwm());
        assert_eq!(read(&b.dir.path().join("mode")), "kernel");
    }

    #[test]
    fn test_stack_failure_releases_earlier_guards() {
        let b = board(ControlMode::User);
        fs::write(&b.paths.pid_file, format!("{}\n", std::process::id())).unwrap();

        let err = GuardStack::acquire(&b.cfg, &b.paths).unwrap_err();
        assert!(matches!(err, FanControlError::AlreadyRunning { .. }));
        assert!(!b.paths.lock_file.exists());
        // Hardware was never touched
        assert_eq!(read(&b.dir.path().join("pwm1")), "77");
        assert_eq!(read(&b.dir.path().join("mode")), "kernel");
    }

    #[test]
    fn test_hardware_access_checks() {
        let b = board(ControlMode::User);
        assert!(check_hardware_access(&b.cfg).is_ok());

        let mut missing = board(ControlMode::User);
        missing.cfg.control_mode_path = missing.dir.path().join("nope");
        assert!(matches!(
            check_hardware_access(&missing.cfg),
            Err(FanControlError::PathNotWritable(_))
        ));

        let mut kernel = board(ControlMode::Kernel);
        kernel.cfg.pwm_path = kernel.dir.path().join("absent");
        assert!(matches!(
            check_hardware_access(&kernel.cfg),
            Err(FanControlError::PathNotReadable(_))
        ));
    }
}
