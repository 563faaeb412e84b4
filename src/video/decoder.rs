use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

use image::RgbaImage;
use tracing::{debug, warn};

use crate::audio::{AudioData, AudioLoader, AudioSpec};
use crate::error::{DecodeResult, VideoError};
use crate::project::{MediaKind, SourceRef};

/// Properties of a decodable video source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    /// Native frame rate as reported by the container
    pub fps: f64,
    /// ffmpeg spelling of the frame rate (`30000/1001`)
    pub fps_expr: String,
    /// Duration in seconds
    pub duration: f64,
}

impl SourceMetadata {
    /// Index of the last decodable frame
    pub fn last_frame_index(&self) -> u64 {
        ((self.duration * self.fps).ceil() as u64).saturating_sub(1)
    }

    /// Index of the nearest frame at or before `local_time`, clamped to the source
    pub fn frame_index_at(&self, local_time: f64) -> u64 {
        let local_time = local_time.max(0.0);
        let index = (local_time * self.fps + 1e-6).floor() as u64;
        index.min(self.last_frame_index())
    }
}

/// A stateful decoder for one video source
pub trait VideoSource: Send {
    fn metadata(&self) -> &SourceMetadata;

    /// Return the nearest frame at or before `local_time` (seconds into the source)
    ///
    /// Monotonically increasing access is the fast path; random access must still be
    /// answered correctly.
    fn frame_at(&mut self, local_time: f64) -> DecodeResult<Arc<RgbaImage>>;
}

/// Media decode capability consumed by the element sampler
pub trait MediaBackend: Send + Sync {
    /// Open a stateful decoder for a video file
    fn open_video(&self, path: &Path) -> DecodeResult<Box<dyn VideoSource>>;

    /// Decode a still image
    fn load_image(&self, path: &Path) -> DecodeResult<RgbaImage>;

    /// Decode the complete audio stream of a source
    ///
    /// Returns `Ok(None)` when the source carries no audio, such as a silent video.
    fn load_audio(&self, source: &SourceRef) -> DecodeResult<Option<AudioData>>;
}

/// Frames further ahead than this trigger a seek instead of decoding through
const SEEK_AHEAD_SECONDS: f64 = 2.0;

/// Bytes of ffmpeg diagnostics kept for error messages
const STDERR_TAIL_BYTES: usize = 64 * 1024;

/// Media backend driving the external `ffmpeg`/`ffprobe` executables
#[derive(Debug, Clone)]
pub struct FfmpegMediaBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    /// Layout video audio tracks are extracted in
    audio_spec: AudioSpec,
}

impl FfmpegMediaBackend {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(ffmpeg: P, ffprobe: Q, audio_spec: AudioSpec) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            audio_spec,
        }
    }

    /// Read stream properties with ffprobe
    pub fn probe(&self, path: &Path) -> DecodeResult<SourceMetadata> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v", "error",
                "-select_streams", "v:0",
                "-show_entries", "stream=width,height,avg_frame_rate:format=duration",
                "-of", "default=noprint_wrappers=1",
            ])
            .arg(path)
            .output()
            .map_err(|e| VideoError::OpenFailed {
                path: format!("{}: ffprobe failed to start: {}", path.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::OpenFailed {
                path: format!("{}: {}", path.display(), stderr.trim()),
            }
            .into());
        }

        let text = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&text).ok_or_else(|| {
            VideoError::UnsupportedFormat {
                format: format!("{}: no decodable video stream", path.display()),
            }
            .into()
        })
    }

    fn has_audio_stream(&self, path: &Path) -> DecodeResult<bool> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v", "error",
                "-select_streams", "a",
                "-show_entries", "stream=index",
                "-of", "csv=p=0",
            ])
            .arg(path)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::OpenFailed {
                path: format!("{}: {}", path.display(), stderr.trim()),
            }
            .into());
        }
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    /// Decode a source's audio with ffmpeg into the backend's layout
    fn extract_audio(&self, path: &Path) -> DecodeResult<AudioData> {
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args([
                "-vn",
                "-f", "f32le",
                "-ac", &self.audio_spec.channels.to_string(),
                "-ar", &self.audio_spec.sample_rate.to_string(),
                "pipe:1",
            ])
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::DecodingFailed {
                reason: format!("audio extraction from {} failed: {}", path.display(), stderr.trim()),
            }
            .into());
        }

        let samples = output
            .stdout
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(AudioData::new(
            samples,
            self.audio_spec.sample_rate,
            self.audio_spec.channels,
            path.to_path_buf(),
        ))
    }
}

impl MediaBackend for FfmpegMediaBackend {
    fn open_video(&self, path: &Path) -> DecodeResult<Box<dyn VideoSource>> {
        let metadata = self.probe(path)?;
        debug!(
            "Opened video {:?}: {}x{} @ {:.3}fps, {:.2}s",
            path, metadata.width, metadata.height, metadata.fps, metadata.duration
        );
        Ok(Box::new(FfmpegVideoSource::new(self.ffmpeg.clone(), path.to_path_buf(), metadata)))
    }

    fn load_image(&self, path: &Path) -> DecodeResult<RgbaImage> {
        Ok(image::open(path)?.to_rgba8())
    }

    fn load_audio(&self, source: &SourceRef) -> DecodeResult<Option<AudioData>> {
        match source.kind {
            MediaKind::Image => Ok(None),
            MediaKind::Video => {
                if !self.has_audio_stream(&source.path)? {
                    debug!("{:?} has no audio stream", source.path);
                    return Ok(None);
                }
                self.extract_audio(&source.path).map(Some)
            }
            MediaKind::Audio => {
                if AudioLoader::decodes_natively(&source.path) {
                    AudioLoader::load(&source.path).map(Some)
                } else {
                    self.extract_audio(&source.path).map(Some)
                }
            }
        }
    }
}

/// Parse `key=value` lines printed by ffprobe
fn parse_probe_output(text: &str) -> Option<SourceMetadata> {
    let mut width = None;
    let mut height = None;
    let mut fps_expr = None;
    let mut duration = None;

    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse::<u32>().ok(),
            "height" => height = value.parse::<u32>().ok(),
            "avg_frame_rate" => fps_expr = Some(value.to_string()),
            "duration" => duration = value.parse::<f64>().ok(),
            _ => {}
        }
    }

    let (width, height) = (width?, height?);
    if width == 0 || height == 0 {
        return None;
    }

    let (fps, fps_expr) = match fps_expr.as_deref().and_then(parse_rate) {
        Some(fps) => (fps, fps_expr.unwrap_or_default()),
        None => {
            warn!("Container reports no usable frame rate, assuming 30fps");
            (30.0, "30".to_string())
        }
    };

    Some(SourceMetadata {
        width,
        height,
        fps,
        fps_expr,
        duration: duration.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(1.0 / fps),
    })
}

fn parse_rate(expr: &str) -> Option<f64> {
    let fps = match expr.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => expr.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Arguments that stream `path` from `seek` seconds as RGBA frames on the source's own grid
///
/// Rotation metadata is ignored and every frame is scaled to the probed size, so the
/// pipe always carries `width * height * 4` bytes per frame.
fn frame_pipe_args(path: &Path, metadata: &SourceMetadata, seek: f64) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-ss"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(format!("{:.6}", seek).into());
    args.push("-i".into());
    args.push(path.as_os_str().to_owned());
    args.extend(["-an", "-sn", "-vf"].map(OsString::from));
    args.push(
        format!(
            "fps={},scale={}:{}",
            metadata.fps_expr, metadata.width, metadata.height
        )
        .into(),
    );
    args.extend(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"].map(OsString::from));
    args
}

/// Read a child's stderr to the end on its own thread, keeping the last `STDERR_TAIL_BYTES`
fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut tail = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            match stderr.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    tail.extend_from_slice(&chunk[..n]);
                    if tail.len() > STDERR_TAIL_BYTES {
                        let excess = tail.len() - STDERR_TAIL_BYTES;
                        tail.drain(..excess);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&tail).trim().to_string()
    })
}

/// Streams raw RGBA frames out of an `ffmpeg` child process
///
/// The stream is resampled to the source's own frame grid, so the n-th frame read after
/// a seek to frame `k` is frame `k + n`. Forward requests decode through the pipe;
/// backward or far-forward requests restart the process at the new position.
pub struct FfmpegVideoSource {
    ffmpeg: PathBuf,
    path: PathBuf,
    metadata: SourceMetadata,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<JoinHandle<String>>,
    /// Index of the frame the pipe will yield next
    next_index: u64,
    current: Option<(u64, Arc<RgbaImage>)>,
    /// Lowered when the stream ends before its probed duration
    last_index: u64,
}

impl FfmpegVideoSource {
    fn new(ffmpeg: PathBuf, path: PathBuf, metadata: SourceMetadata) -> Self {
        let last_index = metadata.last_frame_index();
        Self {
            ffmpeg,
            path,
            metadata,
            child: None,
            stdout: None,
            stderr_drain: None,
            next_index: 0,
            current: None,
            last_index,
        }
    }

    fn frame_bytes(&self) -> usize {
        self.metadata.width as usize * self.metadata.height as usize * 4
    }

    fn restart_at(&mut self, index: u64) -> DecodeResult<()> {
        self.stop();

        let seek = index as f64 / self.metadata.fps;
        debug!("Seeking {:?} to frame {} ({:.3}s)", self.path, index, seek);

        let mut child = Command::new(&self.ffmpeg)
            .args(frame_pipe_args(&self.path, &self.metadata, seek))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VideoError::DecodingFailed {
                reason: format!("failed to spawn ffmpeg for {}: {}", self.path.display(), e),
            })?;

        self.stdout = child.stdout.take();
        self.stderr_drain = child.stderr.take().map(drain_stderr);
        self.child = Some(child);
        self.next_index = index;
        self.current = None;
        Ok(())
    }

    /// Read the next frame from the pipe; `Ok(None)` at end of stream
    fn read_next(&mut self) -> DecodeResult<Option<RgbaImage>> {
        let frame_bytes = self.frame_bytes();
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buffer = vec![0u8; frame_bytes];
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        self.next_index += 1;
        let image = RgbaImage::from_raw(self.metadata.width, self.metadata.height, buffer)
            .ok_or_else(|| VideoError::DecodingFailed {
                reason: "frame buffer size mismatch".to_string(),
            })?;
        Ok(Some(image))
    }

    fn join_stderr(&mut self) -> String {
        match self.stderr_drain.take().map(JoinHandle::join) {
            Some(Ok(text)) => text,
            Some(Err(_)) => "(stderr drain thread panicked)".to_string(),
            None => String::new(),
        }
    }

    /// Collect ffmpeg's diagnostics once the process has ended
    fn finish_with_error(&mut self) -> String {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        self.join_stderr()
    }

    fn stop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.join_stderr();
    }
}

impl VideoSource for FfmpegVideoSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn frame_at(&mut self, local_time: f64) -> DecodeResult<Arc<RgbaImage>> {
        let target = self.metadata.frame_index_at(local_time).min(self.last_index);
        let retries = (SEEK_AHEAD_SECONDS * self.metadata.fps).ceil() as u64;
        self.frame_at_index(target, retries)
    }
}

impl FfmpegVideoSource {
    /// `retries` bounds how far back we step when a seek lands past the real end
    fn frame_at_index(&mut self, target: u64, retries: u64) -> DecodeResult<Arc<RgbaImage>> {
        if let Some((index, frame)) = &self.current {
            if *index == target {
                return Ok(Arc::clone(frame));
            }
        }

        let seek_ahead = (SEEK_AHEAD_SECONDS * self.metadata.fps).ceil() as u64;
        if self.child.is_none() || target < self.next_index || target - self.next_index > seek_ahead {
            self.restart_at(target)?;
        }

        while self.next_index <= target {
            match self.read_next()? {
                Some(image) => {
                    self.current = Some((self.next_index - 1, Arc::new(image)));
                }
                None => break,
            }
        }

        if let Some((index, frame)) = &self.current {
            if *index == target {
                return Ok(Arc::clone(frame));
            }
        }

        // The pipe ended before reaching the target
        let stderr = self.finish_with_error();
        match &self.current {
            // Probed duration overshoots the real stream: hold the last frame
            Some((index, frame)) => {
                self.last_index = *index;
                Ok(Arc::clone(frame))
            }
            None if !stderr.is_empty() => Err(VideoError::DecodingFailed {
                reason: format!("{}: {}", self.path.display(), stderr),
            }
            .into()),
            // Seeked past the real end; step back towards it
            None if target > 0 && retries > 0 => {
                self.last_index = target - 1;
                self.frame_at_index(target - 1, retries - 1)
            }
            None => Err(VideoError::NoFrames {
                path: self.path.display().to_string(),
            }
            .into()),
        }
    }
}

impl Drop for FfmpegVideoSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::error::DecodeError;

    fn metadata(fps: f64, duration: f64) -> SourceMetadata {
        SourceMetadata {
            width: 16,
            height: 8,
            fps,
            fps_expr: fps.to_string(),
            duration,
        }
    }

    #[test]
    fn test_parse_probe_output() {
        let text = "width=1280\nheight=720\navg_frame_rate=30000/1001\nduration=12.500000\n";
        let meta = parse_probe_output(text).unwrap();
        assert_eq!((meta.width, meta.height), (1280, 720));
        assert!((meta.fps - 29.97).abs() < 0.01);
        assert_eq!(meta.fps_expr, "30000/1001");
        assert_eq!(meta.duration, 12.5);
    }

    #[test]
    fn test_parse_probe_output_without_video_stream() {
        assert!(parse_probe_output("duration=3.0\n").is_none());
        assert!(parse_probe_output("width=0\nheight=0\n").is_none());
    }

    #[test]
    fn test_parse_probe_output_falls_back_on_bad_rate() {
        let meta = parse_probe_output("width=2\nheight=2\navg_frame_rate=0/0\nduration=N/A\n").unwrap();
        assert_eq!(meta.fps, 30.0);
        assert!((meta.duration - 1.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_frame_index_is_at_or_before() {
        let meta = metadata(30.0, 2.0);
        assert_eq!(meta.last_frame_index(), 59);
        assert_eq!(meta.frame_index_at(0.0), 0);
        assert_eq!(meta.frame_index_at(0.999), 29);
        assert_eq!(meta.frame_index_at(1.0), 30);
        assert_eq!(meta.frame_index_at(-1.0), 0);
        // Clamped to the source length
        assert_eq!(meta.frame_index_at(10.0), 59);
    }

    #[test]
    fn test_frame_pipe_args_pin_geometry() {
        let args: Vec<String> = frame_pipe_args(Path::new("/media/clip.mov"), &metadata(30.0, 2.0), 1.5)
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let joined = args.join(" ");
        assert!(joined.starts_with("-v error -nostdin -noautorotate -ss 1.500000 -i /media/clip.mov"));
        assert!(joined.contains("-vf fps=30,scale=16:8"));
        assert!(joined.ends_with("-f rawvideo -pix_fmt rgba pipe:1"));
    }

    /// Fake ffmpeg/ffprobe pair: a 2x2 source at 10fps whose frame `i` is filled with byte `i + 1`
    #[cfg(unix)]
    struct ScriptedMedia {
        dir: tempfile::TempDir,
        backend: FfmpegMediaBackend,
    }

    /// Serializes script creation against process spawning in sibling tests
    #[cfg(unix)]
    static SCRIPTED: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[cfg(unix)]
    impl ScriptedMedia {
        fn new(reported_duration: f64, frames: u32, prelude: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let log = dir.path().join("invocations.log");
            let ffprobe = write_script(
                dir.path(),
                "ffprobe",
                &format!("printf 'width=2\\nheight=2\\navg_frame_rate=10/1\\nduration={reported_duration}\\n'\n"),
            );
            let ffmpeg = write_script(
                dir.path(),
                "ffmpeg",
                &format!(
                    r#"ss=0
prev=
for arg in "$@"; do
  if [ "$prev" = "-ss" ]; then ss=$arg; fi
  prev=$arg
done
echo "$*" >> '{log}'
{prelude}
i=$(awk -v s="$ss" 'BEGIN {{ printf "%d", s * 10 + 0.5 }}')
while [ "$i" -lt {frames} ]; do
  b="\\$(printf '%03o' $((i + 1)))"
  j=0
  while [ $j -lt 16 ]; do printf "$b"; j=$((j + 1)); done
  i=$((i + 1))
done
"#,
                    log = log.display(),
                ),
            );
            Self {
                dir,
                backend: FfmpegMediaBackend::new(ffmpeg, ffprobe, AudioSpec::default()),
            }
        }

        fn open(&self) -> Box<dyn VideoSource> {
            self.backend.open_video(&self.dir.path().join("clip.mp4")).unwrap()
        }

        /// Command lines ffmpeg was started with, one per (re)start
        fn invocations(&self) -> Vec<String> {
            std::fs::read_to_string(self.dir.path().join("invocations.log"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn fill(frame: &RgbaImage) -> u8 {
        let value = frame.get_pixel(0, 0).0[0];
        assert!(frame.pixels().all(|p| p.0 == [value; 4]));
        value
    }

    #[cfg(unix)]
    #[test]
    fn test_sequential_reads_stay_on_one_process() {
        let _guard = SCRIPTED.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let media = ScriptedMedia::new(6.0, 60, "");
        let mut source = media.open();

        for index in 0..10u8 {
            let frame = source.frame_at(f64::from(index) / 10.0).unwrap();
            assert_eq!(fill(&frame), index + 1);
        }
        // Repeating the current time reuses the held frame
        assert_eq!(fill(&source.frame_at(0.9).unwrap()), 10);

        let invocations = media.invocations();
        assert_eq!(invocations.len(), 1);
        assert!(invocations[0].contains("-noautorotate"));
        assert!(invocations[0].contains("fps=10/1,scale=2:2"));
    }

    #[cfg(unix)]
    #[test]
    fn test_backward_jump_restarts_at_target() {
        let _guard = SCRIPTED.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let media = ScriptedMedia::new(6.0, 60, "");
        let mut source = media.open();

        assert_eq!(fill(&source.frame_at(0.5).unwrap()), 6);
        assert_eq!(fill(&source.frame_at(0.2).unwrap()), 3);

        let invocations = media.invocations();
        assert_eq!(invocations.len(), 2);
        assert!(invocations[1].contains("-ss 0.200000"));
    }

    #[cfg(unix)]
    #[test]
    fn test_far_forward_jump_restarts_but_near_one_decodes_through() {
        let _guard = SCRIPTED.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let media = ScriptedMedia::new(6.0, 60, "");
        let mut source = media.open();

        assert_eq!(fill(&source.frame_at(0.0).unwrap()), 1);
        // 1.5s ahead is within the two-second window
        assert_eq!(fill(&source.frame_at(1.5).unwrap()), 16);
        assert_eq!(media.invocations().len(), 1);

        assert_eq!(fill(&source.frame_at(5.0).unwrap()), 51);
        let invocations = media.invocations();
        assert_eq!(invocations.len(), 2);
        assert!(invocations[1].contains("-ss 5.000000"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stream_ending_early_holds_last_frame() {
        let _guard = SCRIPTED.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let media = ScriptedMedia::new(6.0, 30, "");
        let mut source = media.open();

        for index in 0..=20u8 {
            assert_eq!(fill(&source.frame_at(f64::from(index) / 10.0).unwrap()), index + 1);
        }
        // Decodes through to the real end at frame 29 and holds it
        assert_eq!(fill(&source.frame_at(3.5).unwrap()), 30);
        assert_eq!(fill(&source.frame_at(5.0).unwrap()), 30);
        assert_eq!(media.invocations().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_seek_past_real_end_steps_back() {
        let _guard = SCRIPTED.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let media = ScriptedMedia::new(3.5, 30, "");
        let mut source = media.open();

        assert_eq!(fill(&source.frame_at(3.4).unwrap()), 30);
        // Frames 34 down to 29 were each tried once
        assert_eq!(media.invocations().len(), 6);
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_stderr_does_not_stall_the_pipe() {
        let _guard = SCRIPTED.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let media = ScriptedMedia::new(6.0, 60, "head -c 262144 /dev/zero | tr '\\0' e >&2");
        let mut source = media.open();

        assert_eq!(fill(&source.frame_at(0.0).unwrap()), 1);
        assert_eq!(fill(&source.frame_at(0.1).unwrap()), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_decoder_failure_reports_stderr() {
        let _guard = SCRIPTED.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let media = ScriptedMedia::new(6.0, 60, "echo 'clip.mp4: Invalid data found when processing input' >&2\nexit 1");
        let mut source = media.open();

        match source.frame_at(0.0) {
            Err(DecodeError::Video(VideoError::DecodingFailed { reason })) => {
                assert!(reason.contains("Invalid data found"), "unexpected reason: {reason}");
            }
            Err(other) => panic!("expected DecodingFailed, got {other:?}"),
            Ok(_) => panic!("expected DecodingFailed, got a frame"),
        }
    }
}
