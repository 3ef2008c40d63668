use std::path::Path;

use anyhow::Context;
use tokio::process::Command;

/// Three-valued probe result. `Unknown` means the check itself failed
/// (tool missing, exec error), not that the answer is "no".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Yes,
    No,
    Unknown,
}

/// Terminal multiplexer flavors used for detached sessions and command
/// injection. Screen is tried before tmux everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplexer {
    Screen,
    Tmux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

/// Abstract process-control surface the supervisor depends on. Any concrete
/// OS provides these differently; tests substitute a scripted mock.
pub trait ProcessControl: Send + Sync {
    /// Process-table scan for a running executable name.
    fn scan_process(&self, pattern: &str) -> impl Future<Output = Probe> + Send;
    /// Does a named multiplexer session exist?
    fn session_exists(&self, mux: Multiplexer, session: &str) -> impl Future<Output = Probe> + Send;
    /// Can we bind the server's UDP port? Bind success implies no listener.
    fn port_is_free(&self, port: u16) -> impl Future<Output = Probe> + Send;
    /// Launch the executable inside a new detached multiplexer session.
    fn launch_session(
        &self,
        mux: Multiplexer,
        session: &str,
        dir: &Path,
        exec: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
    /// Raw background spawn with output redirected to a file. Last resort.
    fn spawn_detached(
        &self,
        dir: &Path,
        exec: &str,
        log: &Path,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
    /// Inject text into a previously created session as if typed.
    fn inject(
        &self,
        mux: Multiplexer,
        session: &str,
        text: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
    /// Signal every process matching the pattern.
    fn signal_all(
        &self,
        pattern: &str,
        sig: Signal,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Real implementation shelling out to pgrep/screen/tmux/pkill.
#[derive(Debug, Default, Clone)]
pub struct ShellControl;

impl ProcessControl for ShellControl {
    async fn scan_process(&self, pattern: &str) -> Probe {
        match Command::new("pgrep").arg("-f").arg(pattern).output().await {
            Ok(out) if out.status.success() => Probe::Yes,
            // pgrep exits 1 when nothing matched; anything else is an error.
            Ok(out) if out.status.code() == Some(1) => Probe::No,
            Ok(_) => Probe::Unknown,
            Err(_) => Probe::Unknown,
        }
    }

    async fn session_exists(&self, mux: Multiplexer, session: &str) -> Probe {
        match mux {
            Multiplexer::Screen => {
                // `screen -ls` exits non-zero even on success with no
                // sessions; go by the listing text instead of the status.
                match Command::new("screen").arg("-ls").output().await {
                    Ok(out) => {
                        let listing = String::from_utf8_lossy(&out.stdout);
                        if listing.contains(session) {
                            Probe::Yes
                        } else {
                            Probe::No
                        }
                    }
                    Err(_) => Probe::Unknown,
                }
            }
            Multiplexer::Tmux => {
                match Command::new("tmux")
                    .args(["has-session", "-t", session])
                    .output()
                    .await
                {
                    Ok(out) if out.status.success() => Probe::Yes,
                    Ok(out) if out.status.code() == Some(1) => Probe::No,
                    Ok(_) => Probe::Unknown,
                    Err(_) => Probe::Unknown,
                }
            }
        }
    }

    async fn port_is_free(&self, port: u16) -> Probe {
        // Bedrock listens on UDP. A successful bind means nothing holds the
        // port; drop the socket immediately.
        match std::net::UdpSocket::bind(("0.0.0.0", port)) {
            Ok(sock) => {
                drop(sock);
                Probe::Yes
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => Probe::No,
            Err(_) => Probe::Unknown,
        }
    }

    async fn launch_session(
        &self,
        mux: Multiplexer,
        session: &str,
        dir: &Path,
        exec: &str,
    ) -> anyhow::Result<()> {
        let exec_rel = format!("./{exec}");
        let out = match mux {
            Multiplexer::Screen => Command::new("screen")
                .args(["-dmS", session])
                .arg(&exec_rel)
                .current_dir(dir)
                .output()
                .await
                .context("run screen")?,
            Multiplexer::Tmux => Command::new("tmux")
                .args(["new-session", "-d", "-s", session])
                .arg(&exec_rel)
                .current_dir(dir)
                .output()
                .await
                .context("run tmux")?,
        };
        if !out.status.success() {
            anyhow::bail!(
                "{:?} launch failed: {}",
                mux,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(())
    }

    async fn spawn_detached(&self, dir: &Path, exec: &str, log: &Path) -> anyhow::Result<()> {
        let out_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .with_context(|| format!("open spawn log {}", log.display()))?;
        let err_file = out_file.try_clone().context("clone spawn log handle")?;

        let mut cmd = Command::new(dir.join(exec));
        cmd.current_dir(dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::from(out_file))
            .stderr(std::process::Stdio::from(err_file));

        #[cfg(unix)]
        {
            // Own session so the server outlives this agent.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("spawn {} (cwd {})", exec, dir.display()))?;
        // Deliberately not awaited; the child runs in its own session.
        drop(child);
        Ok(())
    }

    async fn inject(&self, mux: Multiplexer, session: &str, text: &str) -> anyhow::Result<()> {
        let out = match mux {
            Multiplexer::Screen => Command::new("screen")
                .args(["-S", session, "-X", "stuff"])
                .arg(format!("{text}\n"))
                .output()
                .await
                .context("run screen stuff")?,
            Multiplexer::Tmux => Command::new("tmux")
                .args(["send-keys", "-t", session, text, "Enter"])
                .output()
                .await
                .context("run tmux send-keys")?,
        };
        if !out.status.success() {
            anyhow::bail!(
                "{:?} injection failed: {}",
                mux,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(())
    }

    async fn signal_all(&self, pattern: &str, sig: Signal) -> anyhow::Result<()> {
        let flag = match sig {
            Signal::Term => "-TERM",
            Signal::Kill => "-KILL",
        };
        let out = Command::new("pkill")
            .args([flag, "-f", pattern])
            .output()
            .await
            .context("run pkill")?;
        // Exit 1 means no process matched, which is fine here: the target
        // may have exited between the probe and the signal.
        match out.status.code() {
            Some(0) | Some(1) => Ok(()),
            other => anyhow::bail!("pkill {flag} exited with {other:?}"),
        }
    }
}
