// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 / YOLO11 人体检测
// 包含: 模型加载、预处理、推理、后处理

use anyhow::{Context, Result};
use ndarray::{Array, Axis, IxDyn};

use super::registry::ModelSpec;
use super::{letterbox, Detector};
use crate::config::RuntimeConfig;
use crate::types::{BBox, Frame};
use crate::{non_max_suppression, OrtBackend, OrtConfig, PipelineError};

/// 候选框最低置信度 (检测阈值由流水线再次过滤)
pub const CONF_FLOOR: f32 = 0.05;
pub const IOU_THRESHOLD: f32 = 0.45;
/// COCO person
const PERSON_CLASS: usize = 0;
const CXYWH_OFFSET: usize = 4;

/// YOLOv8 模型结构
pub struct YOLOv8 {
    engine: OrtBackend,
    name: &'static str,
    width: u32,
    height: u32,
    conf: f32,
    iou: f32,
}

impl YOLOv8 {
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

    /// letterbox (左上对齐) + 归一化到 [0,1], NCHW
    pub fn preprocess(&self, frame: &Frame) -> Result<(Array<f32, IxDyn>, f32)> {
        let (img, ratio) = letterbox(frame, (self.width, self.height), 114)?;
        let mut ys = Array::zeros((1, 3, self.height as usize, self.width as usize)).into_dyn();
        for (x, y, rgb) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = rgb.0;
            ys[[0, 0, y, x]] = (r as f32) / 255.0;
            ys[[0, 1, y, x]] = (g as f32) / 255.0;
            ys[[0, 2, y, x]] = (b as f32) / 255.0;
        }
        Ok((ys, ratio))
    }

    pub fn run(&mut self, frame: &Frame) -> Result<Vec<BBox>> {
        let (xs, ratio) = self.preprocess(frame)?;
        let ys = self.engine.run(xs)?;
        let preds = ys.first().context("YOLOv8 没有输出")?;
        postprocess(
            preds,
            ratio,
            (frame.width() as f32, frame.height() as f32),
            self.conf,
            self.iou,
        )
    }
}

/// 解码 [1, 4+nc, N] 输出, 只保留 person 类别
pub fn postprocess(
    preds: &Array<f32, IxDyn>,
    ratio: f32,
    original_size: (f32, f32),
    conf: f32,
    iou: f32,
) -> Result<Vec<BBox>> {
    let shape = preds.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= CXYWH_OFFSET + PERSON_CLASS {
        anyhow::bail!("YOLOv8 输出形状异常: {:?}", shape);
    }
    let (width_original, height_original) = original_size;

    let anchor = preds.index_axis(Axis(0), 0);
    let mut data = Vec::new();
    for pred in anchor.axis_iter(Axis(1)) {
        let confidence = pred[CXYWH_OFFSET + PERSON_CLASS];
        if confidence.is_nan() || confidence < conf {
            continue;
        }

        let cx = pred[0] / ratio;
        let cy = pred[1] / ratio;
        let w = pred[2] / ratio;
        let h = pred[3] / ratio;
        data.push(
            BBox::from_cxcywh(cx, cy, w, h, confidence.min(1.0))
                .clamp(width_original, height_original),
        );
    }

    non_max_suppression(&mut data, iou);
    Ok(data)
}

impl Detector for YOLOv8 {
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
    use ndarray::Array3;

    /// 构造 [1, 4+nc, N] 输出
    fn raw_output(cols: &[[f32; 6]]) -> Array<f32, IxDyn> {
        let mut a = Array3::<f32>::zeros((1, 6, cols.len()));
        for (i, col) in cols.iter().enumerate() {
            for (r, v) in col.iter().enumerate() {
                a[[0, r, i]] = *v;
            }
        }
        a.into_dyn()
    }

    #[test]
    fn test_postprocess_person_only_and_scaled() {
        let preds = raw_output(&[
            // cx, cy, w, h, person, other
            [100., 100., 40., 80., 0.9, 0.1],
            [300., 300., 40., 40., 0.02, 0.95],
        ]);
        let boxes = postprocess(&preds, 0.5, (1000., 1000.), CONF_FLOOR, IOU_THRESHOLD).unwrap();
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (160., 120., 240., 280.));
        assert!((b.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_nms_keeps_best() {
        let preds = raw_output(&[
            [100., 100., 50., 100., 0.6, 0.],
            [102., 101., 50., 100., 0.8, 0.],
            [400., 100., 50., 100., 0.3, 0.],
        ]);
        let boxes = postprocess(&preds, 1.0, (640., 640.), CONF_FLOOR, IOU_THRESHOLD).unwrap();
        assert_eq!(boxes.len(), 2);
        assert!((boxes[0].confidence - 0.8).abs() < 1e-6);
        assert!((boxes[1].confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_clamps_to_frame() {
        let preds = raw_output(&[[5., 5., 40., 40., 0.7, 0.]]);
        let boxes = postprocess(&preds, 1.0, (30., 30.), CONF_FLOOR, IOU_THRESHOLD).unwrap();
        assert_eq!((boxes[0].x1, boxes[0].y1, boxes[0].x2, boxes[0].y2), (0., 0., 25., 25.));
    }

    #[test]
    fn test_postprocess_rejects_bad_shape() {
        let preds = Array::<f32, IxDyn>::zeros(IxDyn(&[1, 84]));
        assert!(postprocess(&preds, 1.0, (10., 10.), CONF_FLOOR, IOU_THRESHOLD).is_err());
    }
}
