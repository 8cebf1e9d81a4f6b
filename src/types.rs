// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 姿态流水线数据结构定义
/// Data structures shared by the pose video pipeline
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::visualize::Topology;

/// 解码帧: H x W x 3 (RGB, 8bit)
pub type Frame = RgbImage;

/// 单帧所有实例的姿态结果 (每个检测框一项)
pub type FramePoseResults = Vec<PoseResult>;

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    /// 由中心点+宽高构造 (YOLO 输出格式)
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32, confidence: f32) -> Self {
        Self::new(cx - w / 2., cy - h / 2., cx + w / 2., cy + h / 2., confidence)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2., (self.y1 + self.y2) / 2.)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// 裁剪到图像范围内
    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0., width),
            y1: self.y1.clamp(0., height),
            x2: self.x2.clamp(0., width),
            y2: self.y2.clamp(0., height),
            confidence: self.confidence,
        }
    }

    pub fn intersection_area(&self, another: &BBox) -> f32 {
        let l = self.x1.max(another.x1);
        let r = self.x2.min(another.x2);
        let t = self.y1.max(another.y1);
        let b = self.y2.min(another.y2);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn iou(&self, another: &BBox) -> f32 {
        let inter = self.intersection_area(another);
        let union = self.area() + another.area() - inter;
        if union <= 0. {
            0.
        } else {
            inter / union
        }
    }
}

/// 关键点: 坐标 + 置信度
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }
}

/// 单个实例的姿态 (关键点数量由姿态模型拓扑决定)
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseResult {
    pub keypoints: Vec<Keypoint>,
}

impl PoseResult {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Keypoint> {
        self.keypoints.get(idx)
    }
}

/// 视频帧率 (有理数, 保证输出与输入完全一致)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: i32,
    pub den: i32,
}

impl FrameRate {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 预测缓存: Predict → Redraw 之间传递的唯一状态
///
/// 按帧顺序保存全部姿态结果 (包括低置信度关键点), Redraw 时只需
/// 更换可视化参数即可重绘, 无需再次推理。调用方应原样传回。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionCache {
    topology: Topology,
    frames: Vec<FramePoseResults>,
}

impl PredictionCache {
    pub fn new(topology: Topology, frames: Vec<FramePoseResults>) -> Self {
        Self { topology, frames }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn frames(&self) -> &[FramePoseResults] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 从 JSON 文件加载
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// 保存为 JSON 文件
    pub fn save(&self, path: &std::path::Path) -> crate::Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
