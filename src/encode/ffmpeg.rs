use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::audio::AudioChunk;
use crate::encode::params::{AudioCodec, VideoCodec};
use crate::encode::session::{EncoderBackend, EncoderFactory, EncoderSettings};
use crate::error::{ExportError, Result};
use crate::export::options::ExportFormat;
use crate::video::Frame;

/// Creates [`FfmpegBackend`]s sharing one tool path and scratch location
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    ffmpeg: PathBuf,
    temp_dir: Option<PathBuf>,
    background: [u8; 3],
}

impl FfmpegEncoderFactory {
    pub fn new<P: Into<PathBuf>>(ffmpeg: P, temp_dir: Option<PathBuf>, background: [u8; 4]) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            temp_dir,
            background: [background[0], background[1], background[2]],
        }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn create(&self) -> Result<Box<dyn EncoderBackend>> {
        Ok(Box::new(FfmpegBackend::new(
            self.ffmpeg.clone(),
            self.temp_dir.clone(),
            self.background,
        )))
    }
}

/// Two-pass encoder driving the `ffmpeg` executable
///
/// Pass one streams opaque RGBA frames into ffmpeg's stdin and encodes the video
/// stream, while mixed audio is spooled to a raw `f32le` file. On finish, a second pass
/// muxes the video stream (copied) with the encoded audio. All scratch files live in a
/// temporary directory removed with the backend.
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    temp_parent: Option<PathBuf>,
    /// Color transparent canvas areas are flattened onto
    background: [u8; 3],

    settings: Option<EncoderSettings>,
    scratch: Option<TempDir>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    audio_file: Option<BufWriter<File>>,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: PathBuf, temp_parent: Option<PathBuf>, background: [u8; 3]) -> Self {
        Self {
            ffmpeg,
            temp_parent,
            background,
            settings: None,
            scratch: None,
            child: None,
            stdin: None,
            stderr_drain: None,
            audio_file: None,
        }
    }

    /// Check the required encoders are compiled into this ffmpeg
    fn check_encoders(&self, settings: &EncoderSettings) -> Result<()> {
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                ExportError::encoder_init(format!(
                    "failed to run {} (is ffmpeg installed and on PATH?): {}",
                    self.ffmpeg.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            return Err(ExportError::encoder_init(format!(
                "{} -encoders exited with {}",
                self.ffmpeg.display(),
                output.status
            )));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        let mut required = vec![settings.params.video_codec.encoder()];
        if settings.audio.is_some() {
            required.push(settings.params.audio_codec.encoder());
        }
        for encoder in required {
            if !encoder_listed(&listing, encoder) {
                return Err(ExportError::encoder_init(format!(
                    "ffmpeg was built without the {} encoder",
                    encoder
                )));
            }
        }
        Ok(())
    }

    fn scratch_path(&self, name: &str) -> Result<PathBuf> {
        self.scratch
            .as_ref()
            .map(|dir| dir.path().join(name))
            .ok_or_else(|| ExportError::encode("encoder not started"))
    }

    /// Wait for pass one and report its diagnostics on failure
    fn finish_video_pass(&mut self) -> Result<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ExportError::encode("encoder not started"))?;

        let status = child
            .wait()
            .map_err(|e| ExportError::encode(format!("failed to wait for ffmpeg: {}", e)))?;
        let stderr = self.join_stderr();

        if !status.success() {
            return Err(ExportError::encode(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn join_stderr(&mut self) -> String {
        match self.stderr_drain.take().map(|handle| handle.join()) {
            Some(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Err(e))) => format!("(stderr unreadable: {})", e),
            Some(Err(_)) => "(stderr drain thread panicked)".to_string(),
            None => String::new(),
        }
    }

    /// Describe a broken pipe using whatever ffmpeg printed before dying
    fn pipe_error(&mut self, err: std::io::Error) -> ExportError {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        let stderr = self.join_stderr();
        ExportError::encode(format!("failed to write frame to ffmpeg: {} {}", err, stderr.trim()))
    }
}

impl EncoderBackend for FfmpegBackend {
    fn begin(&mut self, settings: &EncoderSettings) -> Result<()> {
        let canvas = settings.canvas;
        if canvas.width == 0 || canvas.height == 0 || canvas.width % 2 != 0 || canvas.height % 2 != 0 {
            return Err(ExportError::encoder_init(format!(
                "canvas {}x{} is not encodable as yuv420p",
                canvas.width, canvas.height
            )));
        }

        self.check_encoders(settings)?;

        let scratch = match &self.temp_parent {
            Some(parent) => tempfile::Builder::new().prefix("timeline-export-").tempdir_in(parent),
            None => tempfile::Builder::new().prefix("timeline-export-").tempdir(),
        }
        .map_err(|e| ExportError::encoder_init(format!("failed to create scratch directory: {}", e)))?;

        let video_path = scratch.path().join(format!("video{}", settings.format.extension()));
        let mut child = Command::new(&self.ffmpeg)
            .args(video_pass_args(settings, &video_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExportError::encoder_init(format!("failed to spawn ffmpeg: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExportError::encoder_init("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExportError::encoder_init("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        if settings.audio.is_some() {
            let file = File::create(scratch.path().join("audio.f32le"))
                .map_err(|e| ExportError::encoder_init(format!("failed to create audio spool: {}", e)))?;
            self.audio_file = Some(BufWriter::new(file));
        }

        debug!("Encoder scratch directory {:?}", scratch.path());
        self.scratch = Some(scratch);
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.settings = Some(*settings);
        Ok(())
    }

    fn write_video(&mut self, _index: u64, frame: &Frame) -> Result<()> {
        let pixels = frame.to_opaque_rgba(self.background);
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ExportError::encode("video stream is closed"))?;
        if let Err(e) = stdin.write_all(&pixels) {
            return Err(self.pipe_error(e));
        }
        Ok(())
    }

    fn write_audio(&mut self, chunk: &AudioChunk) -> Result<()> {
        let file = self
            .audio_file
            .as_mut()
            .ok_or_else(|| ExportError::encode("encoder has no audio stream"))?;
        file.write_all(&chunk.to_le_bytes())?;
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        let settings = self
            .settings
            .ok_or_else(|| ExportError::encode("encoder not started"))?;
        self.finish_video_pass()?;

        let video_path = self.scratch_path(&format!("video{}", settings.format.extension()))?;
        let output_path = match self.audio_file.take() {
            None => video_path,
            Some(mut file) => {
                file.flush()?;
                drop(file);

                let audio_path = self.scratch_path("audio.f32le")?;
                let output_path = self.scratch_path(&format!("output{}", settings.format.extension()))?;
                let output = Command::new(&self.ffmpeg)
                    .args(mux_pass_args(&settings, &video_path, &audio_path, &output_path))
                    .stdin(Stdio::null())
                    .output()
                    .map_err(|e| ExportError::encode(format!("failed to spawn ffmpeg mux pass: {}", e)))?;
                if !output.status.success() {
                    return Err(ExportError::encode(format!(
                        "ffmpeg mux pass exited with status {}: {}",
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }
                output_path
            }
        };

        let bytes = std::fs::read(&output_path)?;
        info!("Encoded {} bytes of {}", bytes.len(), settings.format);

        // Removes every scratch file
        self.scratch = None;
        self.settings = None;
        Ok(bytes)
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        let _ = self.join_stderr();
        self.audio_file = None;
        if let Some(scratch) = self.scratch.take() {
            if let Err(e) = scratch.close() {
                warn!("Failed to remove encoder scratch directory: {}", e);
            }
        }
        self.settings = None;
    }
}

impl Drop for FfmpegBackend {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}

/// Whether `ffmpeg -encoders` output lists `name`
fn encoder_listed(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|encoder| encoder == name)
}

fn format_args(format: ExportFormat) -> Vec<String> {
    let mut args: Vec<String> = ["-fflags", "+bitexact", "-map_metadata", "-1"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if format == ExportFormat::Mp4 {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }
    args.extend(["-f".to_string(), format.muxer().to_string()]);
    args
}

fn video_codec_args(settings: &EncoderSettings) -> Vec<String> {
    let params = &settings.params;
    let bitrate = params.video_bitrate_kbps;
    let mut args = vec!["-c:v".to_string(), params.video_codec.encoder().to_string()];
    match params.video_codec {
        VideoCodec::H264 => args.extend([
            "-preset".to_string(),
            "medium".to_string(),
            "-crf".to_string(),
            params.crf.to_string(),
            "-maxrate".to_string(),
            format!("{}k", bitrate),
            "-bufsize".to_string(),
            format!("{}k", bitrate * 2),
        ]),
        VideoCodec::Vp9 => args.extend([
            "-crf".to_string(),
            params.crf.to_string(),
            "-b:v".to_string(),
            format!("{}k", bitrate),
            "-deadline".to_string(),
            "good".to_string(),
            "-row-mt".to_string(),
            "1".to_string(),
        ]),
    }
    args.extend([
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-flags:v".to_string(),
        "+bitexact".to_string(),
    ]);
    args
}

/// Arguments for pass one: raw RGBA on stdin to a video-only container
fn video_pass_args(settings: &EncoderSettings, output: &Path) -> Vec<String> {
    let canvas = settings.canvas;
    let rate = settings.frame_rate;
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{}x{}", canvas.width, canvas.height),
        "-framerate".into(),
        format!("{}/{}", rate.num(), rate.den()),
        "-i".into(),
        "pipe:0".into(),
        "-an".into(),
    ];
    args.extend(video_codec_args(settings));
    args.extend(format_args(settings.format));
    args.push(output.display().to_string());
    args
}

/// Arguments for pass two: copy the video stream and encode the spooled audio next to it
fn mux_pass_args(settings: &EncoderSettings, video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    let spec = settings.audio.unwrap_or_default();
    let params = &settings.params;
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostdin".into(),
        "-y".into(),
        "-i".into(),
        video.display().to_string(),
        "-f".into(),
        "f32le".into(),
        "-ar".into(),
        spec.sample_rate.to_string(),
        "-ac".into(),
        spec.channels.to_string(),
        "-i".into(),
        audio.display().to_string(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        params.audio_codec.encoder().into(),
        "-b:a".into(),
        format!("{}k", params.audio_bitrate_kbps),
    ];
    // Opus only runs at a handful of rates
    if params.audio_codec == AudioCodec::Opus && !matches!(spec.sample_rate, 8_000 | 12_000 | 16_000 | 24_000 | 48_000) {
        args.extend(["-ar".to_string(), "48000".to_string()]);
    }
    args.extend(["-flags:a".to_string(), "+bitexact".to_string()]);
    args.extend(format_args(settings.format));
    args.push(output.display().to_string());
    args
}
