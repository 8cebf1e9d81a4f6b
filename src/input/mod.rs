/// 视频输入系统 (Video Input System)
///
/// 独立工作线程,负责视频文件解码
/// - Decoder: FFmpeg 软件解码, 按文件顺序输出 RGB 帧, 最多 max_frames 帧
/// - Filter:  帧拷贝与转发 (有界通道, 惰性)
use std::path::Path;

use crate::error::Result;
use crate::types::{Frame, FrameRate};

pub mod decode_filter;
pub mod decoder;

pub use decode_filter::DecodeFilter;
pub use decoder::{probe_frame_rate, FfmpegFrameSource, FfmpegFrameStream};

/// 惰性、有限的帧序列; 丢弃即释放解码资源
pub type FrameStream = Box<dyn Iterator<Item = Result<Frame>> + Send>;

/// 帧源
///
/// 每次 `open` 都从视频开头重新开始。视频帧数少于 `max_frames` 时
/// 序列提前结束 (不是错误)。文件不存在 / 无法解析 / 没有视频流 → Decode 错误。
pub trait FrameSource: Send {
    fn open(&self, path: &Path, max_frames: usize) -> Result<(FrameRate, FrameStream)>;
}
