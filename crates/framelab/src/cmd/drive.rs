use std::fs::File;
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use framelab_link::{Link, RawLink};
use framelab_mux::{ChildIo, Multiplexer, Shutdown};
use tracing::{debug, info, warn};

use crate::cmd::DriveArgs;
use crate::exit::{io_error, link_error, mux_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: DriveArgs) -> CliResult<i32> {
    let links = open_links(&args.interfaces)?;
    drop_privileges()?;

    let (child, child_io) = spawn_child(&args.command)?;
    let interrupted = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(child.id(), interrupted.clone())?;

    let console = if args.no_console {
        None
    } else {
        let fd = io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|err| io_error("duplicate stdin", err))?;
        Some(File::from(fd))
    };

    let result = Multiplexer::new(links, child_io, console, io::stdout())
        .and_then(|mut mux| {
            let shutdown = mux.run();
            info!(stats = ?mux.stats(), "multiplexer stopped");
            shutdown
        });
    // The child's pipes were dropped with the multiplexer.
    drop(child);

    match result {
        Ok(Shutdown::ConsoleClosed) => info!("console closed"),
        Ok(Shutdown::ChildClosed) if interrupted.load(Ordering::SeqCst) => info!("interrupted"),
        Ok(Shutdown::ChildClosed) => info!("child closed its output"),
        Err(err) => return Err(mux_error("drive", err)),
    }
    Ok(SUCCESS)
}

fn open_links(names: &[String]) -> CliResult<Vec<RawLink>> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let link = RawLink::open(name).map_err(|err| link_error("open interface", err))?;
            info!(
                index = i + 1,
                interface = %name,
                mac = %link.mac(),
                mtu = link.mtu(),
                "attached interface"
            );
            Ok(link)
        })
        .collect()
}

/// Give up a setuid-root identity once the packet sockets are open.
fn drop_privileges() -> CliResult<()> {
    // SAFETY: the get*id calls cannot fail and touch no memory.
    let (uid, euid, gid) = unsafe { (libc::getuid(), libc::geteuid(), libc::getgid()) };
    if uid == euid {
        return Ok(());
    }

    // Group first: once the uid is dropped we may no longer change it.
    // SAFETY: plain syscalls on integer arguments.
    if unsafe { libc::setresgid(gid, gid, gid) } != 0 {
        return Err(io_error("drop group privileges", io::Error::last_os_error()));
    }
    // SAFETY: as above.
    if unsafe { libc::setresuid(uid, uid, uid) } != 0 {
        return Err(io_error("drop user privileges", io::Error::last_os_error()));
    }
    debug!(uid, gid, "dropped privileges");
    Ok(())
}

/// Kills and reaps the child when dropped, on every exit path.
struct ChildGuard(Child);

impl ChildGuard {
    fn id(&self) -> u32 {
        self.0.id()
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        reap(&mut self.0);
    }
}

fn spawn_child(command: &[String]) -> CliResult<(ChildGuard, ChildIo)> {
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| CliError::new(crate::exit::USAGE, "missing child command"))?;

    let child = Command::new(program)
        .args(rest)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|err| io_error(&format!("spawn '{program}'"), err))?;
    info!(pid = child.id(), program = %program, "started child");
    let mut child = ChildGuard(child);

    let (Some(stdin), Some(stdout)) = (child.0.stdin.take(), child.0.stdout.take()) else {
        return Err(CliError::new(INTERNAL, "child pipes unavailable"));
    };
    let child_io = ChildIo {
        input: File::from(OwnedFd::from(stdin)),
        output: File::from(OwnedFd::from(stdout)),
    };
    Ok((child, child_io))
}

fn install_ctrlc_handler(pid: u32, interrupted: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        interrupted.store(true, Ordering::SeqCst);
        // SAFETY: kill(2) on the child we spawned; a stale pid only yields ESRCH.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "kill child");
    }
    match child.wait() {
        Ok(status) => debug!(%status, "child exited"),
        Err(err) => warn!(error = %err, "wait for child"),
    }
}
