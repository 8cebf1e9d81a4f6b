/// FFmpeg解码过滤器模块
/// FFmpeg decode filter module
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame as AVFrame};
use image::RgbImage;

/// FFmpeg解码过滤器: 视频文件 → RGB24 帧 → 有界通道
///
/// 前置滤镜 `format=rgb24` 保证这里拿到的是打包的 RGB 数据。
pub struct DecodeFilter {
    tx: Option<Sender<RgbImage>>,
    max_frames: usize,
    sent: usize,
    concealed: usize,
    stop: Arc<AtomicBool>,
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>, max_frames: usize, stop: Arc<AtomicBool>) -> Self {
        Self {
            tx: Some(tx),
            max_frames,
            sent: 0,
            concealed: 0,
            stop,
        }
    }

    /// 达到帧数上限或接收端关闭: 释放发送端并通知解码线程退出
    fn close(&mut self) {
        self.tx = None;
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// 单帧的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCheck {
    /// 正常帧
    Accept,
    /// 解码器标记为损坏, 但已做错误隐藏: 照常输出
    Concealed,
    /// 流结束标记 (空指针): 原样传给下游, 不输出
    EndOfStream,
    /// 没有像素数据: 解码失败
    Invalid,
}

/// 判断单帧的处理方式: 每一帧要么输出, 要么报错, 不会被跳过
pub fn check_frame(is_null: bool, is_empty: bool, is_corrupt: bool) -> FrameCheck {
    if is_null {
        FrameCheck::EndOfStream
    } else if is_empty {
        FrameCheck::Invalid
    } else if is_corrupt {
        FrameCheck::Concealed
    } else {
        FrameCheck::Accept
    }
}

/// 按 linesize 逐行拷贝 RGB24 数据
///
/// # Safety
/// `data` 必须指向至少 `stride * height` 字节的有效内存
unsafe fn copy_rgb24(data: *const u8, stride: usize, width: usize, height: usize) -> Vec<u8> {
    let row_bytes = width * 3;
    let mut buffer = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
        let row = std::slice::from_raw_parts(data.add(y * stride), row_bytes);
        buffer.extend_from_slice(row);
    }
    buffer
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        log::debug!("🎬 解码线程启动 (最多 {} 帧)", self.max_frames);
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: AVFrame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<AVFrame>, String> {
        if self.stop.load(Ordering::Relaxed) {
            return Err("解码已停止".to_string());
        }
        let Some(tx) = self.tx.as_ref() else {
            return Err("解码已停止".to_string());
        };

        let image = unsafe {
            let is_null = frame.as_ptr().is_null();
            let check = if is_null {
                check_frame(true, false, false)
            } else {
                check_frame(false, frame.is_empty(), frame.is_corrupt())
            };
            match check {
                FrameCheck::EndOfStream => return Ok(Some(frame)),
                FrameCheck::Invalid => {
                    return Err(format!("第 {} 帧没有像素数据", self.sent + 1));
                }
                FrameCheck::Concealed => {
                    self.concealed += 1;
                    log::warn!("⚠️ 第 {} 帧有解码错误 (已隐藏), 照常输出", self.sent + 1);
                }
                FrameCheck::Accept => {}
            }

            let w = (*frame.as_ptr()).width as usize;
            let h = (*frame.as_ptr()).height as usize;
            let data = (*frame.as_ptr()).data[0];
            let stride = (*frame.as_ptr()).linesize[0];

            if w == 0 || h == 0 || data.is_null() || stride < 0 || (stride as usize) < w * 3 {
                return Err(format!(
                    "非法帧: {}x{}, linesize={} (需要 rgb24)",
                    w, h, stride
                ));
            }

            let buffer = copy_rgb24(data, stride as usize, w, h);
            RgbImage::from_raw(w as u32, h as u32, buffer)
                .ok_or_else(|| "RGB 缓冲区大小不匹配".to_string())?
        };

        if tx.send(image).is_err() {
            // 接收端已关闭 (调用方提前结束)
            self.close();
            return Err("接收端已关闭".to_string());
        }
        self.sent += 1;

        if self.sent >= self.max_frames {
            log::debug!("已解码 {} 帧, 达到上限", self.sent);
            self.close();
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        self.tx = None;
        log::debug!(
            "✅ 解码线程退出: 输出 {} 帧, 其中 {} 帧有解码错误",
            self.sent,
            self.concealed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_frame_never_skips_pictures() {
        assert_eq!(check_frame(false, false, false), FrameCheck::Accept);
        // 损坏帧照常输出, 帧数保持不变
        assert_eq!(check_frame(false, false, true), FrameCheck::Concealed);
        assert_eq!(check_frame(false, true, false), FrameCheck::Invalid);
        assert_eq!(check_frame(false, true, true), FrameCheck::Invalid);
        assert_eq!(check_frame(true, true, true), FrameCheck::EndOfStream);
    }

    #[test]
    fn test_copy_rgb24_skips_row_padding() {
        // 2x2 图像, 每行 8 字节 (6 字节像素 + 2 字节对齐)
        let raw: Vec<u8> = vec![
            1, 2, 3, 4, 5, 6, 0xEE, 0xEE, //
            7, 8, 9, 10, 11, 12, 0xEE, 0xEE,
        ];
        let out = unsafe { copy_rgb24(raw.as_ptr(), 8, 2, 2) };
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }
}
