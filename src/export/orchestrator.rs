use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use rayon::ThreadPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::AudioMixer;
use crate::config::Config;
use crate::encode::ffmpeg::FfmpegEncoderFactory;
use crate::encode::session::{EncodedOutput, EncoderFactory, EncoderSession};
use crate::error::{ConfigError, ExportError, Result};
use crate::export::job::{ExportJob, JobState};
use crate::export::options::ExportConfiguration;
use crate::project::Project;
use crate::video::{
    ElementSampler, FfmpegMediaBackend, FontdueRasterizer, Frame, FrameCompositor, MediaBackend, TextRasterizer,
};

/// Cooperative cancellation flag shared between a caller and a running export
///
/// The export checks it between frames, so cancellation takes effect within one frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs exports: composites every frame, mixes audio and drives the encoder
///
/// Cheap to clone; clones share backends and the worker pool.
#[derive(Clone)]
pub struct Exporter {
    config: Arc<Config>,
    media: Arc<dyn MediaBackend>,
    text: Arc<dyn TextRasterizer>,
    encoders: Arc<dyn EncoderFactory>,
    pool: Arc<ThreadPool>,
}

impl Exporter {
    /// Exporter using ffmpeg for decoding and encoding and fontdue for text
    pub fn new(config: Config) -> Result<Self> {
        let media = FfmpegMediaBackend::new(
            config.encoder.ffmpeg_path.clone(),
            config.encoder.ffprobe_path.clone(),
            config.audio.spec(),
        );
        let text = FontdueRasterizer::from_config(&config.text);
        let encoders = FfmpegEncoderFactory::new(
            config.encoder.ffmpeg_path.clone(),
            config.encoder.temp_dir.clone(),
            config.render.background,
        );
        Self::with_backends(config, Arc::new(media), Arc::new(text), Arc::new(encoders))
    }

    pub fn with_backends(
        config: Config,
        media: Arc<dyn MediaBackend>,
        text: Arc<dyn TextRasterizer>,
        encoders: Arc<dyn EncoderFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.render.worker_threads)
            .thread_name(|i| format!("export-worker-{}", i))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "render.worker_threads".to_string(),
                value: e.to_string(),
            })?;

        Ok(Self {
            config: Arc::new(config),
            media,
            text,
            encoders,
            pool: Arc::new(pool),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Export `project` on the calling thread
    ///
    /// `on_progress` receives non-decreasing values in [0, 1], one per frame. The final
    /// 1.0 is reported only once the encoder has produced the output.
    pub fn export(
        &self,
        project: &Project,
        options: &ExportConfiguration,
        on_progress: &mut dyn FnMut(f64),
        cancel: &CancelToken,
    ) -> Result<EncodedOutput> {
        let job = Mutex::new(ExportJob::new());
        self.run_job(project, options, on_progress, cancel, &job)
    }

    /// Start an export on the blocking thread pool of the current tokio runtime
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_export(&self, project: Arc<Project>, options: ExportConfiguration) -> ExportHandle {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::new();
        let job = Arc::new(Mutex::new(ExportJob::new()));

        let exporter = self.clone();
        let task_cancel = cancel.clone();
        let task_job = Arc::clone(&job);
        let task = tokio::task::spawn_blocking(move || {
            let mut on_progress = |progress: f64| {
                // Receiver may be gone; the export still runs to completion
                let _ = progress_tx.send(progress);
            };
            exporter.run_job(&project, &options, &mut on_progress, &task_cancel, &task_job)
        });

        ExportHandle {
            progress: progress_rx,
            cancel,
            job,
            task,
        }
    }

    /// Composite a single frame, without encoding
    pub fn render_frame(&self, project: &Project, timestamp: f64) -> Result<Frame> {
        project.validate()?;
        let sampler = ElementSampler::new(project.canvas, Arc::clone(&self.media), Arc::clone(&self.text));
        let compositor = FrameCompositor::new(project.canvas, self.config.render.background, Arc::clone(&self.pool));
        compositor.composite(project, timestamp, &sampler)
    }

    fn run_job(
        &self,
        project: &Project,
        options: &ExportConfiguration,
        on_progress: &mut dyn FnMut(f64),
        cancel: &CancelToken,
        job: &Mutex<ExportJob>,
    ) -> Result<EncodedOutput> {
        with_job(job, |j| j.start());
        let started = Instant::now();
        let result = self.run(project, options, on_progress, cancel, job);

        match &result {
            Ok(output) => {
                with_job(job, |j| j.succeed());
                on_progress(1.0);
                info!(
                    "🎉 Export of '{}' complete: {} frames, {:.1} MB in {:.1}s",
                    project.name,
                    output.video_frames,
                    output.bytes.len() as f64 / 1024.0 / 1024.0,
                    started.elapsed().as_secs_f64()
                );
            }
            Err(ExportError::Cancelled) => {
                with_job(job, |j| j.fail());
                info!("Export of '{}' cancelled", project.name);
            }
            Err(e) => {
                with_job(job, |j| j.fail());
                warn!("Export of '{}' failed: {}", project.name, e);
            }
        }
        result
    }

    fn run(
        &self,
        project: &Project,
        options: &ExportConfiguration,
        on_progress: &mut dyn FnMut(f64),
        cancel: &CancelToken,
        job: &Mutex<ExportJob>,
    ) -> Result<EncodedOutput> {
        options.validate()?;
        project.validate()?;

        let frame_rate = options.frame_rate;
        let duration = project.duration();
        let total_frames = frame_rate.total_frames(duration);
        let audio_spec = self.config.audio.spec();

        info!("🎬 Exporting '{}'", project.name);
        info!(
            "   {}x{} @ {} fps, {:.2}s, {} frames",
            project.canvas.width, project.canvas.height, frame_rate, duration, total_frames
        );
        info!(
            "   Format: {} ({}), audio: {}",
            options.format,
            options.quality,
            if options.include_audio { "yes" } else { "no" }
        );

        let sampler = ElementSampler::new(project.canvas, Arc::clone(&self.media), Arc::clone(&self.text));
        let compositor = FrameCompositor::new(project.canvas, self.config.render.background, Arc::clone(&self.pool));
        let mixer = AudioMixer::new(audio_spec, self.config.audio.limiter_threshold);

        let backend = self.encoders.create()?;
        let audio = options.include_audio.then_some(audio_spec);
        let mut session = EncoderSession::open(options, project.canvas, audio, backend)?;

        for index in 0..total_frames {
            if cancel.is_cancelled() {
                debug!("Cancellation observed before frame {}", index);
                with_job(job, |j| j.begin_cancel());
                session.discard();
                return Err(ExportError::Cancelled);
            }

            let timestamp = frame_rate.timestamp(index);
            if session.has_audio() {
                let range = frame_rate.sample_range(index, audio_spec.sample_rate);
                let (frame, chunk) = self.pool.install(|| {
                    rayon::join(
                        || compositor.composite(project, timestamp, &sampler),
                        || mixer.mix_window(project, range, &sampler),
                    )
                });
                session.push_video_frame(&frame?)?;
                session.push_audio_chunk(&chunk?)?;
            } else {
                let frame = compositor.composite(project, timestamp, &sampler)?;
                session.push_video_frame(&frame)?;
            }

            // 1.0 is held back until the container is finalized
            if index + 1 < total_frames {
                let progress = (index + 1) as f64 / total_frames as f64;
                let progress = with_job(job, |j| j.advance(progress));
                on_progress(progress);
            }
            debug!("Frame {}/{} at {:.3}s", index + 1, total_frames, timestamp);
        }

        if cancel.is_cancelled() {
            debug!("Cancellation observed before finalize");
            with_job(job, |j| j.begin_cancel());
            session.discard();
            return Err(ExportError::Cancelled);
        }

        info!("📦 Finalizing {} container...", options.format);
        session.finalize()
    }
}

fn with_job<T>(job: &Mutex<ExportJob>, f: impl FnOnce(&mut ExportJob) -> T) -> T {
    f(&mut job.lock().unwrap_or_else(PoisonError::into_inner))
}

/// A running export started with [`Exporter::start_export`]
pub struct ExportHandle {
    progress: mpsc::UnboundedReceiver<f64>,
    cancel: CancelToken,
    job: Arc<Mutex<ExportJob>>,
    task: JoinHandle<Result<EncodedOutput>>,
}

impl ExportHandle {
    /// Next progress value; `None` once the export has stopped reporting
    pub async fn next_progress(&mut self) -> Option<f64> {
        self.progress.recv().await
    }

    /// Request cancellation; the export stops at the next frame boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> JobState {
        self.job.lock().unwrap_or_else(PoisonError::into_inner).state()
    }

    pub fn progress(&self) -> f64 {
        self.job.lock().unwrap_or_else(PoisonError::into_inner).progress()
    }

    /// Wait for the terminal result
    pub async fn finish(self) -> Result<EncodedOutput> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ExportError::encode(format!("export task failed: {}", e))),
        }
    }
}
