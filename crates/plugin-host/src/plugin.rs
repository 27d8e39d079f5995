//! A single spawned plugin process: its manifest and the pipes used to
//! talk to it.
//!
//! `stdin`/`stdout` are each behind their own `Mutex`, taken out of the
//! `Child` once at spawn time and held for the process's lifetime — a
//! relay loop that forwards frames to and from the plugin locks each side
//! independently, so reads and writes never block each other.

use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use manifest::Manifest;
use protocol::{host_handshake, read_frame, write_frame, Frame, Limits};
use tracing::debug;

use crate::errors::HostError;

pub struct PluginProcess {
    pub path: PathBuf,
    pub manifest: Manifest,
    pub limits: Limits,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<ChildStdout>,
}

impl Drop for PluginProcess {
    fn drop(&mut self) {
        let mut child = match self.child.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl PluginProcess {
    /// Spawns the plugin at `path`, performs the HELLO handshake, and
    /// parses its manifest. Kills the process on any handshake failure.
    pub fn spawn(path: &Path, our_limits: Limits, our_manifest: &[u8]) -> Result<Self, HostError> {
        let path_str = path.display().to_string();
        let mut cmd = Command::new(path);
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| HostError::Spawn {
            path: path_str.clone(),
            source,
        })?;

        let mut stdin = child.stdin.take().expect("piped stdin");
        let mut stdout = child.stdout.take().expect("piped stdout");

        let handshake_result =
            host_handshake(&mut stdin, &mut stdout, our_limits, our_manifest.to_vec());

        let (limits, manifest_bytes) = match handshake_result {
            Ok(pair) => pair,
            Err(source) => {
                let _ = child.kill();
                return Err(HostError::Handshake { path: path_str, source });
            }
        };

        let manifest = match Manifest::from_cbor_bytes(&manifest_bytes) {
            Ok(m) => m,
            Err(source) => {
                let _ = child.kill();
                return Err(HostError::InvalidManifest { path: path_str, source });
            }
        };

        for cap in &manifest.caps {
            if let Err(source) = cap.validate_schema() {
                let _ = child.kill();
                return Err(HostError::InvalidManifest { path: path_str, source });
            }
        }

        debug!(plugin = %manifest.name, caps = manifest.caps.len(), "plugin handshake complete");

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            limits,
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(stdout),
        })
    }

    /// Writes one frame to the plugin's stdin.
    pub fn send(&self, frame: &Frame) -> Result<(), HostError> {
        let mut stdin = self.stdin.lock().unwrap_or_else(|p| p.into_inner());
        write_frame(&mut *stdin, frame, self.limits.max_frame).map_err(|source| HostError::Frame {
            plugin: self.manifest.name.clone(),
            source,
        })
    }

    /// Reads one frame from the plugin's stdout. `Ok(None)` on clean EOF
    /// (the plugin closed its side).
    pub fn recv(&self) -> Result<Option<Frame>, HostError> {
        let mut stdout = self.stdout.lock().unwrap_or_else(|p| p.into_inner());
        read_frame(&mut *stdout, self.limits.max_frame).map_err(|source| HostError::Frame {
            plugin: self.manifest.name.clone(),
            source,
        })
    }

    pub fn is_alive(&self) -> bool {
        let mut guard = self.child.lock().unwrap_or_else(|p| p.into_inner());
        matches!(guard.try_wait(), Ok(None))
    }
}
