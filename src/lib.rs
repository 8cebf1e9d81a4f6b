#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行参数与运行时配置
pub mod error; // 错误类型
pub mod input; // 视频解码
pub mod models; // 模型接口与具体实现
pub mod ort_backend; // ONNX Runtime 推理后端
pub mod output; // 视频编码
pub mod pipeline; // Predict / Redraw 流水线
pub mod types; // 数据结构
pub mod utils; // 仿射变换等工具
pub mod visualize; // 骨架绘制

pub use crate::config::{Args, Device, PredictParams, RuntimeConfig};
pub use crate::error::{PipelineError, Result};
pub use crate::models::{Detector, PoseEstimator, Registry};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::pipeline::{CancelFlag, Pipeline, SharedPipeline};
pub use crate::types::{BBox, Frame, FramePoseResults, FrameRate, Keypoint, PoseResult, PredictionCache};
pub use crate::visualize::{RenderConfig, Topology};

/// 按置信度降序排序后做 IoU 抑制
pub fn non_max_suppression(xs: &mut Vec<BBox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_suppresses_overlaps() {
        let mut boxes = vec![
            BBox::new(0., 0., 10., 10., 0.6),
            BBox::new(50., 50., 60., 60., 0.7),
            BBox::new(1., 1., 11., 11., 0.9),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].confidence, 0.9);
        assert_eq!(boxes[1].confidence, 0.7);
    }

    #[test]
    fn test_nms_threshold_is_strict() {
        // IoU 恰好 1/3, 阈值略高于 1/3 时保留
        let mut boxes = vec![
            BBox::new(0., 0., 10., 10., 0.9),
            BBox::new(5., 0., 15., 10., 0.8),
        ];
        non_max_suppression(&mut boxes, 1.0 / 3.0 + 1e-6);
        assert_eq!(boxes.len(), 2);
        non_max_suppression(&mut boxes, 0.3);
        assert_eq!(boxes.len(), 1);
    }

    #[test]
    fn test_time_string_format() {
        let s = gen_time_string("-");
        assert_eq!(s.split('-').count(), 7);
    }
}
