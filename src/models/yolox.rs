//! YOLOX 人体检测
//! YOLOX is an anchor-free YOLO with high performance
//!
//! 官方 ONNX 导出 (decode_in_inference=False):
//! - 输入: BGR, 0-255 不归一化, 左上对齐 letterbox, 填充 114
//! - 输出: [1, N, 5+nc], 框为网格相对量, objectness/class 已经过 sigmoid

use anyhow::{Context, Result};
use ndarray::{Array, Axis, IxDyn};

use super::registry::ModelSpec;
use super::yolov8::{CONF_FLOOR, IOU_THRESHOLD};
use super::{letterbox, Detector};
use crate::config::RuntimeConfig;
use crate::types::{BBox, Frame};
use crate::{non_max_suppression, OrtBackend, OrtConfig, PipelineError};

const STRIDES: [u32; 3] = [8, 16, 32];
const CXYWHC_OFFSET: usize = 5;
const PERSON_CLASS: usize = 0;

/// YOLOX 模型结构
pub struct YOLOX {
    engine: OrtBackend,
    name: &'static str,
    width: u32,
    height: u32,
    conf: f32,
    iou: f32,
}

impl YOLOX {
    pub fn new(spec: &ModelSpec, runtime: &RuntimeConfig) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: runtime.model_path(spec.file),
            ep: runtime.device.execution_provider(),
        })?;
        let (width, height) = spec.input_size;

        Ok(Self {
            engine,
            name: spec.name,
            width,
            height,
            conf: CONF_FLOOR,
            iou: IOU_THRESHOLD,
        })
    }

    pub fn preprocess(&self, frame: &Frame) -> Result<(Array<f32, IxDyn>, f32)> {
        let (img, ratio) = letterbox(frame, (self.width, self.height), 114)?;
        let mut ys = Array::zeros((1, 3, self.height as usize, self.width as usize)).into_dyn();
        for (x, y, rgb) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = rgb.0;
            ys[[0, 0, y, x]] = b as f32;
            ys[[0, 1, y, x]] = g as f32;
            ys[[0, 2, y, x]] = r as f32;
        }
        Ok((ys, ratio))
    }

    pub fn run(&mut self, frame: &Frame) -> Result<Vec<BBox>> {
        let (xs, ratio) = self.preprocess(frame)?;
        let ys = self.engine.run(xs)?;
        let preds = ys.first().context("YOLOX 没有输出")?;
        postprocess(
            preds,
            (self.width, self.height),
            ratio,
            (frame.width() as f32, frame.height() as f32),
            self.conf,
            self.iou,
        )
    }
}

/// 各步长网格 (gx, gy, stride), 顺序与检测头输出一致
fn grids(input_size: (u32, u32)) -> Vec<(f32, f32, f32)> {
    let (w, h) = input_size;
    let mut grids = Vec::new();
    for stride in STRIDES {
        for gy in 0..h / stride {
            for gx in 0..w / stride {
                grids.push((gx as f32, gy as f32, stride as f32));
            }
        }
    }
    grids
}

/// 解码 [1, N, 5+nc] 输出, confidence = objectness × person
pub fn postprocess(
    preds: &Array<f32, IxDyn>,
    input_size: (u32, u32),
    ratio: f32,
    original_size: (f32, f32),
    conf: f32,
    iou: f32,
) -> Result<Vec<BBox>> {
    let shape = preds.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[2] <= CXYWHC_OFFSET + PERSON_CLASS {
        anyhow::bail!("YOLOX 输出形状异常: {:?}", shape);
    }
    let grids = grids(input_size);
    if grids.len() != shape[1] {
        anyhow::bail!(
            "YOLOX 候选框数量 {} 与输入尺寸 {:?} 不符 (应为 {})",
            shape[1],
            input_size,
            grids.len()
        );
    }
    let (width_original, height_original) = original_size;

    let mut data = Vec::new();
    for (pred, &(gx, gy, stride)) in preds.index_axis(Axis(0), 0).axis_iter(Axis(0)).zip(&grids) {
        let confidence = pred[4] * pred[CXYWHC_OFFSET + PERSON_CLASS];
        if confidence.is_nan() || confidence < conf {
            continue;
        }

        let cx = (pred[0] + gx) * stride / ratio;
        let cy = (pred[1] + gy) * stride / ratio;
        let w = pred[2].exp() * stride / ratio;
        let h = pred[3].exp() * stride / ratio;
        data.push(
            BBox::from_cxcywh(cx, cy, w, h, confidence.min(1.0))
                .clamp(width_original, height_original),
        );
    }

    non_max_suppression(&mut data, iou);
    Ok(data)
}

impl Detector for YOLOX {
    fn name(&self) -> &str {
        self.name
    }

    fn detect(&mut self, frame: &Frame) -> crate::Result<Vec<BBox>> {
        self.run(frame)
            .map_err(|e| PipelineError::Inference(format!("{}: {:#}", self.name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_count() {
        // 64x64: 8x8 + 4x4 + 2x2
        assert_eq!(grids((64, 64)).len(), 84);
        assert_eq!(grids((640, 640)).len(), 8400);
        assert_eq!(grids((64, 64))[64], (0., 0., 16.));
    }

    #[test]
    fn test_postprocess_decodes_grid_and_objectness() {
        let mut preds = Array::<f32, IxDyn>::zeros(IxDyn(&[1, 84, 7]));
        // 步长 8 网格 (2, 3): 中心 ((0.5+2)*8, (0.5+3)*8) = (20, 28)
        let idx = 3 * 8 + 2;
        let row = [0.5, 0.5, 2f32.ln(), 4f32.ln(), 0.8, 0.75, 0.9];
        for (c, v) in row.iter().enumerate() {
            preds[[0, idx, c]] = *v;
        }
        // 非 person 类别高分, objectness 高
        preds[[0, 70, 4]] = 0.9;
        preds[[0, 70, 6]] = 0.9;

        let boxes = postprocess(&preds, (64, 64), 0.5, (128., 128.), CONF_FLOOR, IOU_THRESHOLD)
            .unwrap();
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        // w = 2*8 = 16, h = 4*8 = 32, 再除以 ratio 0.5
        assert!((b.x1 - 24.).abs() < 1e-3 && (b.x2 - 56.).abs() < 1e-3);
        assert!((b.y1 - 24.).abs() < 1e-3 && (b.y2 - 88.).abs() < 1e-3);
        assert!((b.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_rejects_anchor_mismatch() {
        let preds = Array::<f32, IxDyn>::zeros(IxDyn(&[1, 10, 7]));
        assert!(postprocess(&preds, (64, 64), 1.0, (64., 64.), CONF_FLOOR, IOU_THRESHOLD).is_err());
    }
}
