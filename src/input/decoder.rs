/// 视频文件解码器
/// Video file decoder (FFmpeg software decoding on a worker thread)
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};

use super::decode_filter::DecodeFilter;
use super::{FrameSource, FrameStream};
use crate::error::{PipelineError, Result};
use crate::types::{Frame, FrameRate};

/// 解码通道容量 (背压: 消费者处理慢时解码线程阻塞)
const CHANNEL_CAPACITY: usize = 4;

/// 基于 ez-ffmpeg 的帧源, 每次 open 都从头解码
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameSource;

impl FfmpegFrameSource {
    pub fn new() -> Self {
        Self
    }
}

/// 读取平均帧率 (无效时回退到 r_frame_rate)
pub fn probe_frame_rate(path: &Path) -> Result<FrameRate> {
    let url = path.to_string_lossy().to_string();
    let info = find_video_stream_info(url.clone())
        .map_err(|e| PipelineError::Decode(format!("无法解析视频 {}: {}", url, e)))?
        .ok_or_else(|| PipelineError::Decode(format!("没有视频流: {}", url)))?;

    match info {
        StreamInfo::Video {
            avg_frame_rate,
            r_frame_rate,
            width,
            height,
            ..
        } => {
            let avg = FrameRate::new(avg_frame_rate.num, avg_frame_rate.den);
            let rate = if avg.is_valid() {
                avg
            } else {
                FrameRate::new(r_frame_rate.num, r_frame_rate.den)
            };
            if !rate.is_valid() {
                return Err(PipelineError::Decode(format!("无法确定帧率: {}", url)));
            }
            log::info!("📹 {} ({}x{}, {} fps)", url, width, height, rate);
            Ok(rate)
        }
        _ => Err(PipelineError::Decode(format!("没有视频流: {}", url))),
    }
}

/// 解码线程: 构建 FFmpeg 上下文并等待结束
fn decode(url: String, filter: DecodeFilter) -> Result<()> {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let ctx = FfmpegContext::builder()
        .input(Input::new(url))
        .filter_descs(["format=rgb24"].into())
        .output(out)
        .build()
        .map_err(|e| PipelineError::Decode(format!("构建失败: {}", e)))?;

    let sch = ctx
        .start()
        .map_err(|e| PipelineError::Decode(format!("启动失败: {}", e)))?;
    sch.wait()
        .map_err(|e| PipelineError::Decode(format!("解码失败: {}", e)))
}

impl FrameSource for FfmpegFrameSource {
    fn open(&self, path: &Path, max_frames: usize) -> Result<(FrameRate, FrameStream)> {
        if !path.is_file() {
            return Err(PipelineError::Decode(format!(
                "视频不存在: {}",
                path.display()
            )));
        }
        let rate = probe_frame_rate(path)?;

        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let filter = DecodeFilter::new(tx, max_frames, stop.clone());
        let url = path.to_string_lossy().to_string();

        let handle = std::thread::Builder::new()
            .name("video-decoder".to_string())
            .spawn(move || decode(url, filter))?;

        let stream = FfmpegFrameStream {
            rx: Some(rx),
            stop,
            handle: Some(handle),
        };
        Ok((rate, Box::new(stream)))
    }
}

/// 惰性帧流: 迭代器结束时回收解码线程, 提前丢弃时中止解码
pub struct FfmpegFrameStream {
    rx: Option<Receiver<Frame>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl FfmpegFrameStream {
    fn join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(Ok(())) => Ok(()),
            // 主动停止 (帧数上限/提前丢弃) 时 FFmpeg 会以错误结束, 忽略
            Ok(Err(_)) if self.stop.load(Ordering::Relaxed) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PipelineError::Decode("解码线程异常退出".to_string())),
        }
    }
}

impl Iterator for FfmpegFrameStream {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let rx = self.rx.as_ref()?;
        match rx.recv() {
            Ok(frame) => Some(Ok(frame)),
            Err(_) => {
                // 发送端已释放: 解码结束
                self.rx = None;
                self.join().err().map(Err)
            }
        }
    }
}

impl Drop for FfmpegFrameStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.rx = None;
        if let Err(e) = self.join() {
            log::warn!("⚠️ 解码线程退出异常: {}", e);
        }
    }
}
