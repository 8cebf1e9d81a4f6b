// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// RTMPose SimCC 姿态模型

use anyhow::{Context, Result};
use ndarray::{Array, ArrayView1, Axis, Ix3, IxDyn};

use super::registry::ModelSpec;
use super::topdown::{self, CropMode};
use super::PoseEstimator;
use crate::config::RuntimeConfig;
use crate::types::{BBox, Frame, Keypoint, PoseResult};
use crate::visualize::Topology;
use crate::{OrtBackend, OrtConfig, PipelineError};

/// SimCC 坐标分辨率倍数
pub const SIMCC_SPLIT_RATIO: f32 = 2.0;

pub struct RTMPose {
    engine: OrtBackend,
    name: &'static str,
    input_size: (u32, u32),
    topology: Topology,
}

impl RTMPose {
    pub fn new(spec: &ModelSpec, runtime: &RuntimeConfig) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: runtime.model_path(spec.file),
            ep: runtime.device.execution_provider(),
        })?;
        if engine.output_names().len() < 2 {
            anyhow::bail!("RTMPose 需要 simcc_x / simcc_y 两个输出");
        }
        let topology = topdown::output_topology(engine.output_dims(0).as_deref());
        Ok(Self {
            engine,
            name: spec.name,
            input_size: spec.input_size,
            topology,
        })
    }

    pub fn run(&mut self, frame: &Frame, bbox: &BBox) -> Result<PoseResult> {
        let crop = topdown::crop(frame, bbox, self.input_size, CropMode::Standard)?;
        let ys = self.engine.run(crop.tensor)?;
        let simcc_x = ys.first().context("缺少 simcc_x 输出")?;
        let simcc_y = ys.get(1).context("缺少 simcc_y 输出")?;
        let keypoints = decode_simcc(simcc_x, simcc_y)?;
        Ok(PoseResult::new(topdown::map_back(&keypoints, &crop.to_frame)))
    }
}

fn argmax(v: ArrayView1<f32>) -> (usize, f32) {
    v.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &x)| if x > best.1 { (i, x) } else { best })
}

/// 解码 simcc_x [1, K, Wx] / simcc_y [1, K, Wy]
///
/// 坐标 = argmax / SIMCC_SPLIT_RATIO, 置信度 = min(max_x, max_y)
pub fn decode_simcc(
    simcc_x: &Array<f32, IxDyn>,
    simcc_y: &Array<f32, IxDyn>,
) -> Result<Vec<Keypoint>> {
    let xs = simcc_x.view().into_dimensionality::<Ix3>()?;
    let ys = simcc_y.view().into_dimensionality::<Ix3>()?;
    if xs.dim().0 != 1 || ys.dim().0 != 1 || xs.dim().1 != ys.dim().1 {
        anyhow::bail!(
            "RTMPose 输出形状异常: simcc_x {:?}, simcc_y {:?}",
            xs.shape(),
            ys.shape()
        );
    }

    let keypoints = xs
        .index_axis(Axis(0), 0)
        .outer_iter()
        .zip(ys.index_axis(Axis(0), 0).outer_iter())
        .map(|(row_x, row_y)| {
            let (ix, vx) = argmax(row_x);
            let (iy, vy) = argmax(row_y);
            let confidence = vx.min(vy);
            Keypoint::new(
                ix as f32 / SIMCC_SPLIT_RATIO,
                iy as f32 / SIMCC_SPLIT_RATIO,
                if confidence.is_finite() {
                    confidence.clamp(0., 1.)
                } else {
                    0.
                },
            )
        })
        .collect();
    Ok(keypoints)
}

impl PoseEstimator for RTMPose {
    fn name(&self) -> &str {
        self.name
    }

    fn topology(&self) -> Topology {
        self.topology
    }

    fn estimate(&mut self, frame: &Frame, boxes: &[BBox]) -> crate::Result<Vec<PoseResult>> {
        boxes
            .iter()
            .map(|bbox| {
                self.run(frame, bbox)
                    .map_err(|e| PipelineError::Inference(format!("{}: {:#}", self.name, e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_decode_simcc() {
        let mut sx = Array3::<f32>::zeros((1, 2, 384));
        let mut sy = Array3::<f32>::zeros((1, 2, 512));
        sx[[0, 0, 100]] = 0.8;
        sy[[0, 0, 301]] = 0.6;
        sx[[0, 1, 383]] = 0.2;
        sy[[0, 1, 0]] = 0.9;

        let kpts = decode_simcc(&sx.into_dyn(), &sy.into_dyn()).unwrap();
        assert_eq!(kpts.len(), 2);
        assert_eq!((kpts[0].x, kpts[0].y), (50., 150.5));
        assert!((kpts[0].confidence - 0.6).abs() < 1e-6);
        assert_eq!((kpts[1].x, kpts[1].y), (191.5, 0.));
        assert!((kpts[1].confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_decode_simcc_keypoint_count_mismatch() {
        let sx = Array3::<f32>::zeros((1, 17, 384)).into_dyn();
        let sy = Array3::<f32>::zeros((1, 16, 512)).into_dyn();
        assert!(decode_simcc(&sx, &sy).is_err());
    }
}
