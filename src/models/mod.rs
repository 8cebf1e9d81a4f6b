// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 模型统一接口与实现
///
/// # 架构说明
///
/// ## 检测模型 (Detector)
/// - **YOLOv8** / YOLO11: `yolov8.rs`
/// - **YOLOX**: `yolox.rs`
///
/// 输出 NMS 之后的全部人体候选框, 置信度阈值由流水线的模型槽统一过滤。
///
/// ## 姿态模型 (PoseEstimator)
/// - **ViTPose**: 热力图头, `vitpose.rs`
/// - **RTMPose**: SimCC 头, `rtmpose.rs`
///
/// 两者都是 top-down: 每个检测框裁剪一次 (`topdown.rs`), 每个框输出一个结果。
///
/// ## 注册表 (Registry)
/// 名称 → 构造函数。内置模型来自 `registry.rs` 的静态表, 测试可以注册自定义模型。
use std::sync::Arc;

use anyhow::Context;
use fast_image_resize as fr;
use image::{Rgb, RgbImage};

use crate::config::RuntimeConfig;
use crate::error::{PipelineError, Result};
use crate::types::{BBox, Frame, PoseResult};
use crate::visualize::Topology;

pub mod registry;
pub mod rtmpose;
pub mod topdown;
pub mod vitpose;
pub mod yolov8;
pub mod yolox;

pub use registry::{ModelFamily, ModelSpec};
pub use rtmpose::RTMPose;
pub use vitpose::ViTPose;
pub use yolov8::YOLOv8;
pub use yolox::YOLOX;

/// 人体检测模型
pub trait Detector: Send {
    fn name(&self) -> &str;

    /// 单帧人体候选框 (NMS 之后, 按置信度降序)
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BBox>>;
}

/// 姿态估计模型
pub trait PoseEstimator: Send {
    fn name(&self) -> &str;

    /// 关键点布局
    fn topology(&self) -> Topology;

    /// 每个检测框一个结果, 顺序与输入一致
    fn estimate(&mut self, frame: &Frame, boxes: &[BBox]) -> Result<Vec<PoseResult>>;
}

pub type ModelFactory<T> = Arc<dyn Fn(&RuntimeConfig) -> Result<Box<T>> + Send + Sync>;

/// 模型注册表: 名称 → 构造函数
pub struct Registry<T: ?Sized> {
    entries: Vec<(String, ModelFactory<T>)>,
    default: String,
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            default: self.default.clone(),
        }
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn new(default: &str) -> Self {
        Self {
            entries: Vec::new(),
            default: default.to_string(),
        }
    }

    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&RuntimeConfig) -> Result<Box<T>> + Send + Sync + 'static,
    {
        let factory: ModelFactory<T> = Arc::new(factory);
        self.entries.retain(|(n, _)| n != name);
        self.entries.push((name.to_string(), factory));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// 构造模型: 未知名称或加载失败都返回 Config 错误
    pub fn load(&self, name: &str, runtime: &RuntimeConfig) -> Result<Box<T>> {
        let (_, factory) = self
            .entries
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "未知模型: {} (可选: {})",
                    name,
                    self.names().collect::<Vec<_>>().join(", ")
                ))
            })?;
        factory(runtime).map_err(|e| match e {
            PipelineError::Config(_) => e,
            other => PipelineError::Config(format!("模型 {} 加载失败: {}", name, other)),
        })
    }
}

fn load_error(spec: &ModelSpec, e: anyhow::Error) -> PipelineError {
    PipelineError::Config(format!("模型 {} 加载失败: {:#}", spec.name, e))
}

/// 内置检测模型
pub fn builtin_detectors() -> Registry<dyn Detector> {
    registry::DETECTORS
        .iter()
        .fold(Registry::new(registry::DEFAULT_DETECTOR), |reg, spec| {
            reg.register(spec.name, move |runtime: &RuntimeConfig| {
                let model: Box<dyn Detector> = match spec.family {
                    ModelFamily::YOLOX => {
                        Box::new(YOLOX::new(spec, runtime).map_err(|e| load_error(spec, e))?)
                    }
                    _ => Box::new(YOLOv8::new(spec, runtime).map_err(|e| load_error(spec, e))?),
                };
                Ok(model)
            })
        })
}

/// 内置姿态模型
pub fn builtin_pose_models() -> Registry<dyn PoseEstimator> {
    registry::POSE_MODELS
        .iter()
        .fold(Registry::new(registry::DEFAULT_POSE_MODEL), |reg, spec| {
            reg.register(spec.name, move |runtime: &RuntimeConfig| {
                let model: Box<dyn PoseEstimator> = match spec.family {
                    ModelFamily::RTMPose => {
                        Box::new(RTMPose::new(spec, runtime).map_err(|e| load_error(spec, e))?)
                    }
                    _ => Box::new(ViTPose::new(spec, runtime).map_err(|e| load_error(spec, e))?),
                };
                Ok(model)
            })
        })
}

/// letterbox 缩放 (左上对齐, 其余填充 fill), 返回缩放比例
pub(crate) fn letterbox(
    frame: &Frame,
    input_size: (u32, u32),
    fill: u8,
) -> anyhow::Result<(RgbImage, f32)> {
    let (w0, h0) = frame.dimensions();
    let (w1, h1) = input_size;
    if w0 == 0 || h0 == 0 {
        anyhow::bail!("空帧");
    }
    let ratio = (w1 as f32 / w0 as f32).min(h1 as f32 / h0 as f32);
    let w_new = ((w0 as f32 * ratio).round() as u32).clamp(1, w1);
    let h_new = ((h0 as f32 * ratio).round() as u32).clamp(1, h1);

    let src_image =
        fr::images::Image::from_vec_u8(w0, h0, frame.as_raw().clone(), fr::PixelType::U8x3)?;
    let mut dst_image = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
    let mut resizer = fr::Resizer::new();
    resizer.resize(
        &src_image,
        &mut dst_image,
        &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
    )?;

    let resized = RgbImage::from_raw(w_new, h_new, dst_image.buffer().to_vec())
        .context("缩放结果转换失败")?;
    let mut canvas = RgbImage::from_pixel(w1, h1, Rgb([fill; 3]));
    image::imageops::replace(&mut canvas, &resized, 0, 0);
    Ok((canvas, ratio))
}
