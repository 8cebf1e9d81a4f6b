// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输出系统 (Video Sink)
///
/// - Encoder: FFmpeg H.264 编码, 帧率与帧数与输入一致
/// - StagedOutput: 先写临时文件, finish 成功后才改名为目标文件
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::types::{Frame, FrameRate};

pub mod encoder;

pub use encoder::{FfmpegSinkFactory, FfmpegVideoSink};

/// 流式视频写入: create → write_frame* → finish
///
/// 未调用 finish 就被丢弃的写入器不会在目标路径留下文件。
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// 完成编码并提交输出, 返回写入帧数
    fn finish(self: Box<Self>) -> Result<usize>;
}

pub trait SinkFactory: Send {
    fn create(&self, out_path: &Path, frame_rate: FrameRate) -> Result<Box<dyn VideoSink>>;
}

/// 一次性写出全部帧
pub fn write_video<'a, I>(
    factory: &dyn SinkFactory,
    frames: I,
    frame_rate: FrameRate,
    out_path: &Path,
) -> Result<usize>
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut sink = factory.create(out_path, frame_rate)?;
    for frame in frames {
        sink.write_frame(frame)?;
    }
    sink.finish()
}

/// 暂存输出: 写入同目录的临时文件, commit 时原子改名
#[derive(Debug)]
pub struct StagedOutput {
    staging: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedOutput {
    /// 创建暂存文件 (同时检查目录可写)
    pub fn new(target: &Path) -> Result<Self> {
        let file_name = target
            .file_name()
            .ok_or_else(|| {
                PipelineError::Encode(format!("无效的输出路径: {}", target.display()))
            })?
            .to_string_lossy();
        let staging = target.with_file_name(format!(".{}.part", file_name));

        std::fs::File::create(&staging).map_err(|e| {
            PipelineError::Encode(format!("输出路径不可写 {}: {}", target.display(), e))
        })?;

        Ok(Self {
            staging,
            target: target.to_path_buf(),
            committed: false,
        })
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    pub fn commit(mut self) -> Result<PathBuf> {
        std::fs::rename(&self.staging, &self.target).map_err(|e| {
            PipelineError::Encode(format!("无法写入 {}: {}", self.target.display(), e))
        })?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.staging);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_staged_output_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let staged = StagedOutput::new(&target).unwrap();
        std::fs::File::create(staged.staging_path())
            .unwrap()
            .write_all(b"data")
            .unwrap();
        assert!(!target.exists());

        let path = staged.commit().unwrap();
        assert_eq!(path, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"data");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_staged_output_dropped_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        {
            let staged = StagedOutput::new(&target).unwrap();
            assert!(staged.staging_path().exists());
        }
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_staged_output_unwritable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("out.mp4");
        assert!(matches!(
            StagedOutput::new(&target),
            Err(PipelineError::Encode(_))
        ));
    }
}
