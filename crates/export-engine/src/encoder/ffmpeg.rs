//! ffmpeg-backed recorder.
//!
//! Raw RGBA frames go to ffmpeg's stdin; the container comes back on
//! stdout in 64 KiB chunks collected by a reader thread. stderr is
//! drained on its own thread so ffmpeg never blocks on a full pipe.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use dashview_common::error::{DashviewError, DashviewResult};
use dashview_event_model::ExportFormat;

use crate::canvas::RasterFrame;
use crate::encoder::{Recorder, RecorderFactory, RecorderSpec};

const READ_CHUNK: usize = 64 * 1024;

/// ffmpeg arguments for encoding raw RGBA from stdin to `spec.format` on stdout.
pub fn encoder_args(spec: &RecorderSpec) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s:v",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", spec.width, spec.height));
    args.extend(["-r".to_string(), spec.fps.to_string(), "-i".to_string(), "-".to_string(), "-an".to_string()]);

    let bitrate = format!("{}k", spec.bitrate_kbps);
    let codec: Vec<String> = match spec.format {
        ExportFormat::Mp4H264 => vec![
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-b:v".into(),
            bitrate,
            "-movflags".into(),
            "frag_keyframe+empty_moov+default_base_moof".into(),
            "-f".into(),
            "mp4".into(),
        ],
        ExportFormat::Webm => vec![
            "-c:v".into(),
            "libvpx-vp9".into(),
            "-deadline".into(),
            "realtime".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-b:v".into(),
            bitrate,
            "-f".into(),
            "webm".into(),
        ],
        ExportFormat::Gif => vec![
            "-vf".into(),
            "split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse".into(),
            "-loop".into(),
            "0".into(),
            "-f".into(),
            "gif".into(),
        ],
    };
    args.extend(codec);
    args.push("pipe:1".to_string());
    args
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

struct Running {
    child: Child,
    stdin: Option<ChildStdin>,
    output: Arc<Mutex<Vec<Vec<u8>>>>,
    stdout_task: Option<JoinHandle<std::io::Result<()>>>,
    stderr_task: Option<JoinHandle<String>>,
}

/// Recorder that pipes frames through an ffmpeg child process.
pub struct FfmpegRecorder {
    binary: String,
    running: Option<Running>,
    frame_size: usize,
    frames: u64,
}

impl std::fmt::Debug for FfmpegRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegRecorder")
            .field("binary", &self.binary)
            .field("running", &self.running.is_some())
            .field("frames", &self.frames)
            .finish()
    }
}

impl FfmpegRecorder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            running: None,
            frame_size: 0,
            frames: 0,
        }
    }

    fn drain(output: &Mutex<Vec<Vec<u8>>>) -> Vec<Vec<u8>> {
        output
            .lock()
            .map(|mut chunks| std::mem::take(&mut *chunks))
            .unwrap_or_default()
    }
}

impl Recorder for FfmpegRecorder {
    fn start(&mut self, spec: &RecorderSpec) -> DashviewResult<()> {
        if self.running.is_some() {
            return Err(DashviewError::encoder("ffmpeg recorder already started"));
        }
        let args = encoder_args(spec);
        tracing::debug!(args = ?args, "Starting ffmpeg recorder");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DashviewError::unsupported(format!("{} was not found on PATH", self.binary))
                } else {
                    DashviewError::encoder(format!("Failed to start ffmpeg: {e}"))
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DashviewError::encoder("Failed to capture ffmpeg stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DashviewError::encoder("Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DashviewError::encoder("Failed to capture ffmpeg stderr"))?;

        let output = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&output);
        let stdout_task = std::thread::spawn(move || -> std::io::Result<()> {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                let n = stdout.read(&mut buf)?;
                if n == 0 {
                    return Ok(());
                }
                if let Ok(mut chunks) = sink.lock() {
                    chunks.push(buf[..n].to_vec());
                }
            }
        });
        let stderr_task = std::thread::spawn(move || -> String {
            let mut text = String::new();
            match stderr.read_to_string(&mut text) {
                Ok(_) => text,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::info!(
            pid = child.id(),
            width = spec.width,
            height = spec.height,
            fps = spec.fps,
            format = ?spec.format,
            bitrate_kbps = spec.bitrate_kbps,
            "ffmpeg recorder started"
        );

        self.frame_size = spec.width as usize * spec.height as usize * 4;
        self.running = Some(Running {
            child,
            stdin: Some(stdin),
            output,
            stdout_task: Some(stdout_task),
            stderr_task: Some(stderr_task),
        });
        Ok(())
    }

    fn push_frame(&mut self, frame: &RasterFrame) -> DashviewResult<()> {
        let Some(running) = self.running.as_mut() else {
            return Err(DashviewError::encoder("frame pushed before recorder start"));
        };
        if frame.pixels.len() != self.frame_size {
            return Err(DashviewError::encoder(format!(
                "frame size mismatch: expected {} bytes, got {}",
                self.frame_size,
                frame.pixels.len()
            )));
        }
        let stdin = running
            .stdin
            .as_mut()
            .ok_or_else(|| DashviewError::encoder("ffmpeg stdin already closed"))?;
        stdin
            .write_all(&frame.pixels)
            .map_err(|e| DashviewError::encoder(format!("Failed to write frame to ffmpeg: {e}")))?;
        self.frames += 1;
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<Vec<u8>> {
        match &self.running {
            Some(running) => Self::drain(&running.output),
            None => Vec::new(),
        }
    }

    fn finish(&mut self) -> DashviewResult<Vec<Vec<u8>>> {
        let Some(mut running) = self.running.take() else {
            return Err(DashviewError::encoder("recorder finished before start"));
        };
        if let Some(mut stdin) = running.stdin.take() {
            stdin
                .flush()
                .map_err(|e| DashviewError::encoder(format!("Failed to flush ffmpeg stdin: {e}")))?;
        }

        let read_result = running
            .stdout_task
            .take()
            .map(|task| task.join().unwrap_or_else(|_| Ok(())))
            .unwrap_or(Ok(()));
        let status = running
            .child
            .wait()
            .map_err(|e| DashviewError::encoder(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = running
            .stderr_task
            .take()
            .map(|task| {
                task.join()
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
            })
            .unwrap_or_default();

        if !status.success() {
            return Err(DashviewError::encoder(format!(
                "ffmpeg exited with {status}: {}",
                stderr_output.trim()
            )));
        }
        read_result.map_err(|e| DashviewError::encoder(format!("Failed reading ffmpeg output: {e}")))?;

        let chunks = Self::drain(&running.output);
        tracing::info!(frames = self.frames, chunks = chunks.len(), "ffmpeg recorder finished");
        Ok(chunks)
    }

    fn abort(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        drop(running.stdin.take());
        if let Err(e) = running.child.kill() {
            tracing::debug!(error = %e, "ffmpeg already exited");
        }
        let _ = running.child.wait();
        if let Some(task) = running.stdout_task.take() {
            let _ = task.join();
        }
        if let Some(task) = running.stderr_task.take() {
            let _ = task.join();
        }
        tracing::info!(frames = self.frames, "ffmpeg recorder aborted");
    }

    fn frames_pushed(&self) -> u64 {
        self.frames
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Creates [`FfmpegRecorder`]s after checking the binary exists.
#[derive(Debug, Clone)]
pub struct FfmpegRecorderFactory {
    binary: String,
}

impl Default for FfmpegRecorderFactory {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRecorderFactory {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }
}

impl RecorderFactory for FfmpegRecorderFactory {
    fn create(&self, format: ExportFormat) -> DashviewResult<Box<dyn Recorder>> {
        if !self.is_available() {
            return Err(DashviewError::unsupported(format!(
                "No encoder for {format:?}: expected {} in PATH",
                self.binary
            )));
        }
        Ok(Box::new(FfmpegRecorder::new(self.binary.clone())))
    }
}
