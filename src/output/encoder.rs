/// FFmpeg 视频编码器
/// Video encoder (raw RGB24 frames → H.264 MP4 on a worker thread)
use std::path::Path;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use ez_ffmpeg::{FfmpegContext, Input, Output};

use super::{SinkFactory, StagedOutput, VideoSink};
use crate::error::{PipelineError, Result};
use crate::types::{Frame, FrameRate};

/// 编码通道容量
const CHANNEL_CAPACITY: usize = 8;

/// read callback 返回此值表示输入结束
const AVERROR_EOF: i32 = -0x2046_4F45;

/// H.264 要求宽高为偶数, 奇数尺寸补一像素
const FILTER_DESC: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2,format=yuv420p";

#[derive(Debug, Clone, Default)]
pub struct FfmpegSinkFactory;

impl FfmpegSinkFactory {
    pub fn new() -> Self {
        Self
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn create(&self, out_path: &Path, frame_rate: FrameRate) -> Result<Box<dyn VideoSink>> {
        if !frame_rate.is_valid() {
            return Err(PipelineError::Encode(format!("无效帧率: {}", frame_rate)));
        }
        let staged = StagedOutput::new(out_path)?;
        Ok(Box::new(FfmpegVideoSink {
            staged: Some(staged),
            frame_rate,
            size: None,
            tx: None,
            handle: None,
            frames: 0,
        }))
    }
}

/// 逐帧写入的编码器; 首帧确定分辨率后才启动编码线程
pub struct FfmpegVideoSink {
    staged: Option<StagedOutput>,
    frame_rate: FrameRate,
    size: Option<(u32, u32)>,
    tx: Option<Sender<Vec<u8>>>,
    handle: Option<JoinHandle<Result<()>>>,
    frames: usize,
}

/// 把通道里的原始帧按 FFmpeg 的读取节奏拷贝出去
struct RawFrameReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl RawFrameReader {
    fn read(&mut self, buf: &mut [u8]) -> i32 {
        if self.offset >= self.pending.len() {
            match self.rx.recv() {
                Ok(data) => {
                    self.pending = data;
                    self.offset = 0;
                }
                Err(_) => return AVERROR_EOF,
            }
        }
        let n = buf.len().min(self.pending.len() - self.offset);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        n as i32
    }
}

fn encode(
    rx: Receiver<Vec<u8>>,
    staging: String,
    (width, height): (u32, u32),
    frame_rate: FrameRate,
) -> Result<()> {
    let mut reader = RawFrameReader {
        rx,
        pending: Vec::new(),
        offset: 0,
    };
    let input = Input::new_by_read_callback(move |buf: &mut [u8]| reader.read(buf))
        .set_format("rawvideo")
        .set_input_opts(vec![
            ("video_size".to_string(), format!("{}x{}", width, height)),
            ("pixel_format".to_string(), "rgb24".to_string()),
            ("framerate".to_string(), frame_rate.to_string()),
        ]);
    let output = Output::from(staging)
        .set_video_codec("libx264")
        .set_format("mp4");

    let ctx = FfmpegContext::builder()
        .input(input)
        .filter_descs([FILTER_DESC].into())
        .output(output)
        .build()
        .map_err(|e| PipelineError::Encode(format!("构建失败: {}", e)))?;

    let sch = ctx
        .start()
        .map_err(|e| PipelineError::Encode(format!("启动失败: {}", e)))?;
    sch.wait()
        .map_err(|e| PipelineError::Encode(format!("编码失败: {}", e)))
}

impl FfmpegVideoSink {
    fn start(&mut self, size: (u32, u32)) -> Result<()> {
        let staging = match self.staged.as_ref() {
            Some(staged) => staged.staging_path().to_string_lossy().to_string(),
            None => return Err(PipelineError::Encode("编码器已关闭".to_string())),
        };
        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let frame_rate = self.frame_rate;
        let handle = std::thread::Builder::new()
            .name("video-encoder".to_string())
            .spawn(move || encode(rx, staging, size, frame_rate))?;

        log::debug!("🎞️ 编码线程启动 ({}x{}, {} fps)", size.0, size.1, frame_rate);
        self.size = Some(size);
        self.tx = Some(tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// 关闭输入并等待编码线程结束
    fn join(&mut self) -> Result<()> {
        self.tx = None;
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Encode("编码线程异常退出".to_string())),
        }
    }
}

impl VideoSink for FfmpegVideoSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let size = frame.dimensions();
        match self.size {
            None => self.start(size)?,
            Some(expected) if expected != size => {
                return Err(PipelineError::Encode(format!(
                    "帧尺寸变化: {}x{} → {}x{}",
                    expected.0, expected.1, size.0, size.1
                )));
            }
            Some(_) => {}
        }

        let Some(tx) = self.tx.as_ref() else {
            return Err(PipelineError::Encode("编码器已关闭".to_string()));
        };
        if tx.send(frame.as_raw().clone()).is_err() {
            // 编码线程已退出, 取回它的错误
            self.join()?;
            return Err(PipelineError::Encode("编码线程提前退出".to_string()));
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<usize> {
        if self.frames == 0 {
            return Err(PipelineError::Encode("没有可编码的帧".to_string()));
        }
        self.join()?;

        let staged = self
            .staged
            .take()
            .ok_or_else(|| PipelineError::Encode("编码器已关闭".to_string()))?;
        let path = staged.commit()?;
        log::info!("💾 已写入 {} ({} 帧)", path.display(), self.frames);
        Ok(self.frames)
    }
}

impl Drop for FfmpegVideoSink {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            log::warn!("⚠️ 编码线程退出异常: {}", e);
        }
        // staged 未提交, 随后被丢弃并删除临时文件
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_reader_splits_and_ends() {
        let (tx, rx) = crossbeam_channel::bounded(2);
        tx.send(vec![1, 2, 3, 4, 5]).unwrap();
        drop(tx);
        let mut reader = RawFrameReader {
            rx,
            pending: Vec::new(),
            offset: 0,
        };

        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(reader.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(reader.read(&mut buf), AVERROR_EOF);
    }

    #[test]
    fn test_finish_without_frames_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("empty.mp4");
        let sink = FfmpegSinkFactory::new()
            .create(&target, FrameRate::new(30, 1))
            .unwrap();
        assert!(matches!(sink.finish(), Err(PipelineError::Encode(_))));
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_frame_rate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("bad.mp4");
        assert!(matches!(
            FfmpegSinkFactory::new().create(&target, FrameRate::new(0, 1)),
            Err(PipelineError::Encode(_))
        ));
    }
}
