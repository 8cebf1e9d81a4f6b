// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 命令行参数与运行时配置

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;

use crate::error::{PipelineError, Result};
use crate::ort_backend::OrtEP;
use crate::visualize::RenderConfig;

/// 推理设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(i32),
    TensorRt(i32),
}

impl Device {
    pub fn execution_provider(&self) -> OrtEP {
        match *self {
            Device::Cpu => OrtEP::CPU,
            Device::Cuda(id) => OrtEP::CUDA(id),
            Device::TensorRt(id) => OrtEP::Trt(id),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    /// `cpu` | `cuda` | `cuda:1` | `trt` | `trt:0`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (kind, id) = match s.split_once(':') {
            Some((kind, id)) => {
                let id = id
                    .parse::<i32>()
                    .map_err(|_| format!("无效的设备编号: {}", id))?;
                (kind.to_string(), id)
            }
            None => (s, 0),
        };
        match kind.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(id)),
            "trt" | "tensorrt" => Ok(Device::TensorRt(id)),
            other => Err(format!("未知设备: {} (可选 cpu / cuda[:id] / trt[:id])", other)),
        }
    }
}

/// 进程级运行时配置, 启动时确定, 两个模型槽共用
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub device: Device,
    pub model_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            model_dir: PathBuf::from("models"),
        }
    }
}

static RUNTIME: OnceCell<RuntimeConfig> = OnceCell::new();

impl RuntimeConfig {
    /// 初始化全局配置 (只能调用一次)
    pub fn init(config: RuntimeConfig) -> Result<&'static RuntimeConfig> {
        RUNTIME
            .set(config)
            .map_err(|_| PipelineError::Config("运行时配置已初始化".to_string()))?;
        RUNTIME
            .get()
            .ok_or_else(|| PipelineError::Config("运行时配置未初始化".to_string()))
    }

    pub fn model_path(&self, file: &str) -> PathBuf {
        self.model_dir.join(file)
    }
}

/// Predict 的全部参数
#[derive(Debug, Clone, PartialEq)]
pub struct PredictParams {
    pub detector_name: String,
    pub pose_model_name: String,
    pub det_score_threshold: f32,
    pub max_frames: usize,
    pub render: RenderConfig,
}

pub const MAX_FRAMES_LIMIT: usize = 300;

impl PredictParams {
    /// 范围检查 (模型名称在切换模型时检查)
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.det_score_threshold) {
            return Err(PipelineError::InvalidParameter(format!(
                "det_score_threshold 应在 [0,1] 内, 实际 {}",
                self.det_score_threshold
            )));
        }
        if !(1..=MAX_FRAMES_LIMIT).contains(&self.max_frames) {
            return Err(PipelineError::InvalidParameter(format!(
                "max_frames 应在 [1,{}] 内, 实际 {}",
                MAX_FRAMES_LIMIT, self.max_frames
            )));
        }
        self.render.validate()
    }
}

#[derive(Parser, Clone, Debug)]
#[command(name = "pose-video", version, about = "视频人体姿态估计 (检测 + 关键点 + 骨架绘制)")]
pub struct Args {
    /// 推理设备: cpu | cuda[:id] | trt[:id]
    #[arg(long, global = true, default_value = "cpu")]
    pub device: Device,

    /// ONNX 模型目录
    #[arg(long, global = true, default_value = "models")]
    pub model_dir: PathBuf,

    /// 输出视频目录
    #[arg(long, global = true, default_value = "outputs")]
    pub output_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// 检测 + 姿态估计 + 绘制, 输出标注视频
    Predict {
        /// 输入视频
        video: PathBuf,

        /// 检测模型名称
        #[arg(long, default_value = crate::models::registry::DEFAULT_DETECTOR)]
        detector: String,

        /// 姿态模型名称
        #[arg(long, default_value = crate::models::registry::DEFAULT_POSE_MODEL)]
        pose_model: String,

        /// 检测框置信度阈值
        #[arg(long, default_value_t = 0.5)]
        det_score_threshold: f32,

        /// 最多处理的帧数
        #[arg(long, default_value_t = 60)]
        max_frames: usize,

        #[command(flatten)]
        render: RenderArgs,

        /// 保存预测缓存 (JSON), 供 redraw 使用
        #[arg(long)]
        save_cache: Option<PathBuf>,
    },

    /// 使用缓存的预测结果重新绘制
    Redraw {
        /// 输入视频 (须与 predict 时相同)
        video: PathBuf,

        /// predict --save-cache 生成的 JSON
        #[arg(long)]
        cache: PathBuf,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// 列出可用模型
    Models,
}

#[derive(clap::Args, Clone, Copy, Debug)]
pub struct RenderArgs {
    /// 关键点置信度阈值
    #[arg(long, default_value_t = 0.3)]
    pub vis_kpt_score_threshold: f32,

    /// 关键点半径
    #[arg(long, default_value_t = 4)]
    pub dot_radius: u32,

    /// 骨架线宽
    #[arg(long, default_value_t = 2)]
    pub line_thickness: u32,
}

impl From<RenderArgs> for RenderConfig {
    fn from(args: RenderArgs) -> Self {
        RenderConfig::new(
            args.vis_kpt_score_threshold,
            args.dot_radius,
            args.line_thickness,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PredictParams {
        PredictParams {
            detector_name: "yolov8n".into(),
            pose_model_name: "vitpose-b".into(),
            det_score_threshold: 0.5,
            max_frames: 60,
            render: RenderConfig::default(),
        }
    }

    #[test]
    fn test_device_parse() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:1".parse::<Device>().unwrap(), Device::Cuda(1));
        assert_eq!("trt:2".parse::<Device>().unwrap(), Device::TensorRt(2));
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }

    #[test]
    fn test_predict_params_ranges() {
        assert!(params().validate().is_ok());

        let mut p = params();
        p.max_frames = 0;
        assert!(matches!(p.validate(), Err(PipelineError::InvalidParameter(_))));

        let mut p = params();
        p.max_frames = MAX_FRAMES_LIMIT + 1;
        assert!(p.validate().is_err());

        let mut p = params();
        p.det_score_threshold = -0.1;
        assert!(p.validate().is_err());

        let mut p = params();
        p.render.dot_radius = 11;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let args = Args::parse_from(["pose-video", "predict", "in.mp4"]);
        match args.command {
            Command::Predict {
                det_score_threshold,
                max_frames,
                render,
                save_cache,
                ..
            } => {
                assert_eq!(det_score_threshold, 0.5);
                assert_eq!(max_frames, 60);
                assert_eq!(RenderConfig::from(render), RenderConfig::default());
                assert!(save_cache.is_none());
            }
            _ => panic!("应解析为 predict"),
        }
        assert_eq!(args.device, Device::Cpu);
    }

    #[test]
    fn test_cli_global_device_after_subcommand() {
        let args = Args::parse_from(["pose-video", "models", "--device", "cuda:1"]);
        assert_eq!(args.device, Device::Cuda(1));
        assert!(matches!(args.command, Command::Models));
    }
}
