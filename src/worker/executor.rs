use std::{
    collections::VecDeque,
    fs,
    io::{self, BufRead, BufReader, Read},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{after, never, select, tick, unbounded, Receiver, Sender};
use log::{debug, error, warn};

use crate::models::{
    message::StepMessage,
    step::{Step, StepError, StepKind},
};
use crate::worker::signal::CancelToken;

const STDERR_TAIL: usize = 20;
const CANCEL_POLL: Duration = Duration::from_millis(100);
const DRAIN_IDLE: Duration = Duration::from_millis(250);
const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Interprets a single step. The runner only talks to this seam, which lets
/// tests swap in a recording fake.
pub trait Executor {
    fn execute(&mut self, step: &Step, cancel: &CancelToken) -> Result<(), StepError>;
}

/// Delivers a signal to a process id.
pub type Signaller = fn(u32, libc::c_int) -> io::Result<()>;

/// Runs steps on the local machine, streaming subprocess output to the console.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: PathBuf,
    default_timeout: Option<Duration>,
    kill_grace: Duration,
    signaller: Signaller,
}

enum Event {
    Message(Option<StepMessage>),
    Deadline,
    Tick,
    Kill,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<PathBuf>, default_timeout: Option<Duration>) -> Self {
        Self {
            shell: shell.into(),
            default_timeout,
            kill_grace: DEFAULT_KILL_GRACE,
            signaller: send_signal,
        }
    }

    #[cfg(test)]
    fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    #[cfg(test)]
    fn with_signaller(mut self, signaller: Signaller) -> Self {
        self.signaller = signaller;
        self
    }

    fn signal(&self, pid: u32, signal: libc::c_int) -> bool {
        match (self.signaller)(pid, signal) {
            Ok(()) => true,
            Err(e) => {
                warn!("Signal {} to process {} failed: {}", signal, pid, e);
                false
            }
        }
    }

    fn run_subprocess(
        &self,
        mut command: Command,
        program: &str,
        step: &Step,
        cancel: &CancelToken,
    ) -> Result<(), StepError> {
        if cancel.is_cancelled() {
            return Err(StepError::Cancelled);
        }
        if let Some(dir) = &step.working_dir {
            command.current_dir(dir);
        }
        command
            .envs(step.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| StepError::Launch {
            program: program.to_string(),
            source,
        })?;
        let pid = child.id();
        debug!("Spawned '{}' with pid {}.", program, pid);

        let (sender, receiver) = unbounded();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, sender.clone(), StepMessage::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, sender.clone(), StepMessage::Stderr);
        }
        thread::spawn(move || {
            let _ = sender.send(StepMessage::Exited(child.wait()));
        });

        self.supervise(pid, &receiver, step.timeout.or(self.default_timeout), cancel)
    }

    /// Streams output until the child exits, enforcing the deadline and the
    /// cancellation token along the way.
    fn supervise(
        &self,
        pid: u32,
        receiver: &Receiver<StepMessage>,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<(), StepError> {
        let mut deadline = timeout.map(after).unwrap_or_else(never);
        let mut kill_deadline = never::<Instant>();
        let ticker = tick(CANCEL_POLL);
        let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL);
        let mut terminated_by: Option<StepError> = None;

        let status = loop {
            let event = select! {
                recv(receiver) -> message => Event::Message(message.ok()),
                recv(deadline) -> _ => Event::Deadline,
                recv(ticker) -> _ => Event::Tick,
                recv(kill_deadline) -> _ => Event::Kill,
            };
            match event {
                Event::Message(Some(StepMessage::Exited(status))) => break status,
                Event::Message(Some(message)) => print_output(message, &mut stderr_tail),
                Event::Message(None) => {
                    break Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "child waiter disconnected",
                    ))
                }
                Event::Deadline => {
                    let limit = timeout.unwrap_or_default();
                    warn!("Process {} exceeded {:?}, terminating.", pid, limit);
                    self.signal(pid, libc::SIGTERM);
                    terminated_by = Some(StepError::Timeout(limit));
                    deadline = never();
                    kill_deadline = after(self.kill_grace);
                }
                Event::Tick => {
                    if terminated_by.is_none() && cancel.is_cancelled() {
                        warn!("Interrupted, terminating process {}.", pid);
                        self.signal(pid, libc::SIGTERM);
                        terminated_by = Some(StepError::Cancelled);
                        deadline = never();
                        kill_deadline = after(self.kill_grace);
                    }
                }
                Event::Kill => {
                    warn!("Process {} ignored SIGTERM, killing.", pid);
                    if !self.signal(pid, libc::SIGKILL) {
                        // The waiter thread stays detached and reaps the child
                        // whenever it exits.
                        error!("Cannot stop process {}, no longer waiting for it.", pid);
                        return Err(terminated_by.unwrap_or(StepError::Cancelled));
                    }
                    kill_deadline = never();
                }
            }
        };

        // Readers may still hold buffered lines after the waiter reported.
        while let Ok(message) = receiver.recv_timeout(DRAIN_IDLE) {
            print_output(message, &mut stderr_tail);
        }

        let status = status.map_err(StepError::Wait)?;
        if let Some(reason) = terminated_by {
            return Err(reason);
        }
        if status.success() {
            Ok(())
        } else {
            Err(StepError::Exit {
                code: status.code(),
                stderr_tail: stderr_tail.into_iter().collect(),
            })
        }
    }
}

impl Executor for ShellExecutor {
    fn execute(&mut self, step: &Step, cancel: &CancelToken) -> Result<(), StepError> {
        match &step.kind {
            StepKind::Exec { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                self.run_subprocess(command, program, step, cancel)
            }
            StepKind::Shell(script) => {
                let mut command = Command::new(&self.shell);
                command.arg("-c").arg(script);
                let program = self.shell.display().to_string();
                self.run_subprocess(command, &program, step, cancel)
            }
            StepKind::CreateDir(path) => {
                let path = resolve(step, path);
                fs::create_dir_all(&path).map_err(|e| StepError::filesystem(&path, e))
            }
            StepKind::ClearDir(path) => clear_dir(&resolve(step, path)),
            StepKind::EnsureLine { path, line } => ensure_line(&resolve(step, path), line),
            StepKind::WriteFile {
                path,
                contents,
                mode,
            } => write_file(&resolve(step, path), contents, *mode),
        }
    }
}

fn resolve(step: &Step, path: &Path) -> PathBuf {
    match &step.working_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

fn clear_dir(path: &Path) -> Result<(), StepError> {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(StepError::filesystem(path, e)),
    }
    fs::create_dir_all(path).map_err(|e| StepError::filesystem(path, e))
}

fn ensure_line(path: &Path, line: &str) -> Result<(), StepError> {
    let existing = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(StepError::filesystem(path, e)),
    };
    if existing.lines().any(|present| present == line) {
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(line);
    updated.push('\n');
    write_file(path, &updated, None)
}

fn write_file(path: &Path, contents: &str, mode: Option<u32>) -> Result<(), StepError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StepError::filesystem(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| StepError::filesystem(path, e))?;
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| StepError::filesystem(path, e))?;
    }
    Ok(())
}

fn forward_lines<R>(stream: R, sender: Sender<StepMessage>, wrap: fn(String) -> StepMessage)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    if sender.send(wrap(line)).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

fn print_output(message: StepMessage, stderr_tail: &mut VecDeque<String>) {
    match message {
        StepMessage::Stdout(line) => println!("{}", line),
        StepMessage::Stderr(line) => {
            eprintln!("{}", line);
            if stderr_tail.len() == STDERR_TAIL {
                stderr_tail.pop_front();
            }
            stderr_tail.push_back(line);
        }
        StepMessage::Exited(_) => {}
    }
}

fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
