// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 姿态视频流水线 (Pose Video Pipeline)
///
/// 单线程按帧串行, 解码和编码各自在工作线程, 通过有界通道衔接:
/// - Predict: 解码 → 检测 → 姿态估计 → 绘制 → 编码, 同时记录预测缓存
/// - Redraw:  解码 → 按帧序号取缓存结果 → 绘制 → 编码 (不做推理)
///
/// 状态: Idle → Running(Predict|Redraw) → Idle。同一实例不允许并发,
/// 方法取 `&mut self`; 跨线程共享时用 `SharedPipeline`。
pub mod slot;

pub use slot::ModelSlot;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Instant;

use crate::config::{PredictParams, RuntimeConfig};
use crate::error::{PipelineError, Result};
use crate::input::{FfmpegFrameSource, FrameSource};
use crate::models::{builtin_detectors, builtin_pose_models, Detector, PoseEstimator, Registry};
use crate::output::{FfmpegSinkFactory, SinkFactory};
use crate::types::PredictionCache;
use crate::visualize::{self, RenderConfig};

/// 进度日志间隔 (帧)
const PROGRESS_INTERVAL: usize = 30;

/// 取消标志: 在帧之间检查, 当前帧处理完后以 Cancelled 结束
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

pub struct Pipeline {
    runtime: RuntimeConfig,
    detector: ModelSlot<dyn Detector>,
    pose: ModelSlot<dyn PoseEstimator>,
    source: Box<dyn FrameSource>,
    sinks: Box<dyn SinkFactory>,
    output_dir: PathBuf,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(
        runtime: RuntimeConfig,
        detectors: Registry<dyn Detector>,
        pose_models: Registry<dyn PoseEstimator>,
        source: Box<dyn FrameSource>,
        sinks: Box<dyn SinkFactory>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            detector: ModelSlot::new(detectors),
            pose: ModelSlot::new(pose_models),
            source,
            sinks,
            output_dir: output_dir.into(),
            cancel: CancelFlag::new(),
        }
    }

    /// 内置模型 + FFmpeg 解码/编码
    pub fn with_defaults(runtime: RuntimeConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            runtime,
            builtin_detectors(),
            builtin_pose_models(),
            Box::new(FfmpegFrameSource::new()),
            Box::new(FfmpegSinkFactory::new()),
            output_dir,
        )
    }

    /// 使用外部传入的取消标志
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// 取消句柄 (可在其他线程调用 cancel)
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn detector_name(&self) -> Option<&str> {
        self.detector.active_name()
    }

    pub fn pose_model_name(&self) -> Option<&str> {
        self.pose.active_name()
    }

    pub fn detector_registry(&self) -> &Registry<dyn Detector> {
        self.detector.registry()
    }

    pub fn pose_model_registry(&self) -> &Registry<dyn PoseEstimator> {
        self.pose.registry()
    }

    pub fn set_detector(&mut self, name: &str) -> Result<()> {
        self.detector.set_model(name, &self.runtime)
    }

    pub fn set_pose_model(&mut self, name: &str) -> Result<()> {
        self.pose.set_model(name, &self.runtime)
    }

    /// 检测 + 姿态估计 + 绘制, 返回输出视频路径和预测缓存
    pub fn predict(
        &mut self,
        video: &Path,
        params: &PredictParams,
    ) -> Result<(PathBuf, PredictionCache)> {
        params.validate()?;
        // 两个模型都加载成功后才切换
        let detector = self.detector.prepare(&params.detector_name, &self.runtime)?;
        let pose = self.pose.prepare(&params.pose_model_name, &self.runtime)?;
        if let Some(model) = detector {
            self.detector.commit(&params.detector_name, model);
        }
        if let Some(model) = pose {
            self.pose.commit(&params.pose_model_name, model);
        }
        let topology = self.pose.topology()?;
        self.cancel.reset();

        let (frame_rate, frames) = self.source.open(video, params.max_frames)?;
        let out_path = self.output_path(video, "predict")?;
        let mut sink = self.sinks.create(&out_path, frame_rate)?;

        log::info!(
            "▶️ Predict {} (检测: {}, 姿态: {}, 最多 {} 帧)",
            video.display(),
            params.detector_name,
            params.pose_model_name,
            params.max_frames
        );
        let start = Instant::now();
        let mut results = Vec::new();
        let mut instances = 0;
        for frame in frames {
            let frame = frame?;
            self.check_cancelled()?;

            let boxes = self.detector.detect(&frame, params.det_score_threshold)?;
            let poses = self.pose.estimate(&frame, &boxes)?;
            let annotated = visualize::render(&frame, &poses, topology, &params.render);
            sink.write_frame(&annotated)?;

            instances += poses.len();
            results.push(poses);
            if results.len() % PROGRESS_INTERVAL == 0 {
                log::info!(
                    "📊 {} 帧, {} 个实例, {:.1} fps",
                    results.len(),
                    instances,
                    results.len() as f64 / start.elapsed().as_secs_f64()
                );
            }
        }

        if results.is_empty() {
            return Err(PipelineError::Decode(format!(
                "视频没有可解码的帧: {}",
                video.display()
            )));
        }
        if results.len() < params.max_frames {
            log::warn!(
                "⚠️ 视频只有 {} 帧 (max_frames = {})",
                results.len(),
                params.max_frames
            );
        }
        sink.finish()?;

        log::info!(
            "✅ Predict 完成: {} 帧, 用时 {:.2}s",
            results.len(),
            start.elapsed().as_secs_f64()
        );
        Ok((out_path, PredictionCache::new(topology, results)))
    }

    /// 用缓存的预测结果重新绘制 (不做推理)
    pub fn redraw(
        &mut self,
        video: &Path,
        cache: &PredictionCache,
        render: &RenderConfig,
    ) -> Result<PathBuf> {
        render.validate()?;
        if cache.is_empty() {
            return Err(PipelineError::InvalidParameter(
                "预测缓存为空, 请先运行 predict".to_string(),
            ));
        }
        self.cancel.reset();

        let (frame_rate, frames) = self.source.open(video, cache.len())?;
        let out_path = self.output_path(video, "redraw")?;
        let mut sink = self.sinks.create(&out_path, frame_rate)?;

        log::info!("▶️ Redraw {} ({} 帧)", video.display(), cache.len());
        let mut written = 0;
        for (frame, poses) in frames.zip(cache.frames()) {
            let frame = frame?;
            self.check_cancelled()?;

            let annotated = visualize::render(&frame, poses, cache.topology(), render);
            sink.write_frame(&annotated)?;
            written += 1;
        }

        // 未提交的 sink 在这里被丢弃, 不会留下输出文件
        if written < cache.len() {
            return Err(PipelineError::Mismatch {
                expected: cache.len(),
                actual: written,
            });
        }
        sink.finish()?;

        log::info!("✅ Redraw 完成: {} 帧", written);
        Ok(out_path)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            log::warn!("⏹️ 任务已取消");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// `<output_dir>/<stem>-<kind>-<时间戳>.mp4`
    fn output_path(&self, video: &Path, kind: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            PipelineError::Encode(format!(
                "无法创建输出目录 {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        let base = format!("{}-{}-{}", stem, kind, crate::gen_time_string(""));

        let mut path = self.output_dir.join(format!("{}.mp4", base));
        let mut n = 1;
        while path.exists() {
            path = self.output_dir.join(format!("{}-{}.mp4", base, n));
            n += 1;
        }
        Ok(path)
    }
}

/// 跨线程共享的流水线: 正在运行时再次调用直接返回 Busy
#[derive(Clone)]
pub struct SharedPipeline {
    inner: Arc<Mutex<Pipeline>>,
    cancel: CancelFlag,
}

impl SharedPipeline {
    pub fn new(pipeline: Pipeline) -> Self {
        let cancel = pipeline.cancel_flag();
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
            cancel,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Pipeline>> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(PipelineError::Busy),
            // 上一次运行 panic, 流水线本身没有跨帧状态, 继续使用
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }

    pub fn predict(
        &self,
        video: &Path,
        params: &PredictParams,
    ) -> Result<(PathBuf, PredictionCache)> {
        self.lock()?.predict(video, params)
    }

    pub fn redraw(
        &self,
        video: &Path,
        cache: &PredictionCache,
        render: &RenderConfig,
    ) -> Result<PathBuf> {
        self.lock()?.redraw(video, cache, render)
    }

    pub fn set_detector(&self, name: &str) -> Result<()> {
        self.lock()?.set_detector(name)
    }

    pub fn set_pose_model(&self, name: &str) -> Result<()> {
        self.lock()?.set_pose_model(name)
    }

    /// 取消正在运行的任务
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.inner.try_lock(), Err(TryLockError::WouldBlock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!flag.is_cancelled());
        other.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!other.is_cancelled());
    }

    #[test]
    fn test_output_path_unique_and_named() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("outputs");
        let pipeline = Pipeline::with_defaults(RuntimeConfig::default(), &out_dir);

        let a = pipeline.output_path(Path::new("/data/dance.mp4"), "predict").unwrap();
        std::fs::write(&a, b"").unwrap();
        let b = pipeline.output_path(Path::new("/data/dance.mp4"), "predict").unwrap();

        assert!(out_dir.is_dir());
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("dance-predict-"));
        assert!(name.ends_with(".mp4"));
    }
}
