// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ViTPose 热力图姿态模型 (UDP 解码 + 翻转测试)

use anyhow::{Context, Result};
use ndarray::{s, Array, Array2, Array4, ArrayView2, Axis, Ix4, IxDyn, Zip};

use super::registry::ModelSpec;
use super::topdown::{self, CropMode};
use super::PoseEstimator;
use crate::config::RuntimeConfig;
use crate::types::{BBox, Frame, Keypoint, PoseResult};
use crate::visualize::Topology;
use crate::{OrtBackend, OrtConfig, PipelineError};

/// DARK 细化前的高斯平滑核
pub const BLUR_KERNEL: usize = 11;

pub struct ViTPose {
    engine: OrtBackend,
    name: &'static str,
    input_size: (u32, u32),
    topology: Topology,
}

impl ViTPose {
    pub fn new(spec: &ModelSpec, runtime: &RuntimeConfig) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: runtime.model_path(spec.file),
            ep: runtime.device.execution_provider(),
        })?;
        let topology = topdown::output_topology(engine.output_dims(0).as_deref());
        Ok(Self {
            engine,
            name: spec.name,
            input_size: spec.input_size,
            topology,
        })
    }

    pub fn run(&mut self, frame: &Frame, bbox: &BBox) -> Result<PoseResult> {
        let crop = topdown::crop(frame, bbox, self.input_size, CropMode::Unbiased)?;
        let pairs = self.topology.flip_pairs();

        let mut heatmaps = self.infer(crop.tensor.clone())?;
        if !pairs.is_empty() {
            let mut flipped = crop.tensor;
            flipped.invert_axis(Axis(3));
            let flipped = self.infer(flipped.as_standard_layout().into_owned())?;
            heatmaps = merge_flipped(&heatmaps, flipped, pairs)?;
        }

        let keypoints = decode_heatmaps(&heatmaps, self.input_size)?;
        Ok(PoseResult::new(topdown::map_back(&keypoints, &crop.to_frame)))
    }

    fn infer(&mut self, xs: Array<f32, IxDyn>) -> Result<Array4<f32>> {
        let ys = self.engine.run(xs)?;
        let y = ys.into_iter().next().context("ViTPose 没有输出")?;
        let shape = y.shape().to_vec();
        y.into_dimensionality::<Ix4>()
            .with_context(|| format!("ViTPose 输出形状异常: {:?}", shape))
    }
}

/// 翻转输入得到的热力图: 沿 W 翻回, 左右通道互换, 再与原结果取平均
///
/// UDP 下像素中心对齐, 翻回后不需要再平移一列。
pub fn merge_flipped(
    heatmaps: &Array4<f32>,
    flipped: Array4<f32>,
    pairs: &[(usize, usize)],
) -> Result<Array4<f32>> {
    if heatmaps.shape() != flipped.shape() {
        anyhow::bail!(
            "翻转热力图形状不一致: {:?} vs {:?}",
            heatmaps.shape(),
            flipped.shape()
        );
    }
    let k = heatmaps.dim().1;
    let mut back = flipped;
    back.invert_axis(Axis(3));
    for &(a, b) in pairs {
        if a >= k || b >= k || a == b {
            continue;
        }
        let (mut ca, mut cb) = back.multi_slice_mut((s![.., a, .., ..], s![.., b, .., ..]));
        Zip::from(&mut ca).and(&mut cb).for_each(std::mem::swap);
    }
    Ok((heatmaps + &back) * 0.5)
}

/// 解码 [1, K, H, W] 热力图 (UDP)
///
/// argmax 后用 DARK 做亚像素细化, 坐标按 (输入-1)/(热力图-1) 缩放,
/// 置信度取原始峰值。返回模型输入坐标系下的关键点。
pub fn decode_heatmaps(heatmaps: &Array4<f32>, input_size: (u32, u32)) -> Result<Vec<Keypoint>> {
    let (n, k, hh, hw) = heatmaps.dim();
    if n != 1 || hh < 2 || hw < 2 {
        anyhow::bail!("ViTPose 输出形状异常: {:?}", heatmaps.shape());
    }
    let stride_x = (input_size.0 as f32 - 1.) / (hw as f32 - 1.);
    let stride_y = (input_size.1 as f32 - 1.) / (hh as f32 - 1.);

    let mut keypoints = Vec::with_capacity(k);
    for hm in heatmaps.index_axis(Axis(0), 0).axis_iter(Axis(0)) {
        let mut peak = f32::NEG_INFINITY;
        let (mut px, mut py) = (0usize, 0usize);
        for ((y, x), &v) in hm.indexed_iter() {
            if v > peak {
                peak = v;
                px = x;
                py = y;
            }
        }

        if !(peak > 0. && peak.is_finite()) {
            keypoints.push(Keypoint::new(0., 0., 0.));
            continue;
        }
        let (x, y) = refine_dark(hm, px, py);
        keypoints.push(Keypoint::new(x * stride_x, y * stride_y, peak.min(1.)));
    }
    Ok(keypoints)
}

/// 对平滑后的对数热力图做二阶泰勒展开, 求峰值的亚像素位置
fn refine_dark(hm: ArrayView2<f32>, px: usize, py: usize) -> (f32, f32) {
    let log_map = gaussian_blur(hm, BLUR_KERNEL).mapv(|v| v.clamp(0.001, 50.).ln());
    let (h, w) = log_map.dim();
    // 越界按边缘取值
    let at = |dx: isize, dy: isize| {
        let x = (px as isize + dx).clamp(0, w as isize - 1) as usize;
        let y = (py as isize + dy).clamp(0, h as isize - 1) as usize;
        log_map[[y, x]]
    };

    let i = at(0, 0);
    let (ix1, ix1_) = (at(1, 0), at(-1, 0));
    let (iy1, iy1_) = (at(0, 1), at(0, -1));
    let (ix1y1, ix1_y1_) = (at(1, 1), at(-1, -1));

    let dx = 0.5 * (ix1 - ix1_);
    let dy = 0.5 * (iy1 - iy1_);
    let dxx = ix1 - 2. * i + ix1_ + f32::EPSILON;
    let dyy = iy1 - 2. * i + iy1_ + f32::EPSILON;
    let dxy = 0.5 * (ix1y1 - ix1 - iy1 + i + i - ix1_ - iy1_ + ix1_y1_);

    let det = dxx * dyy - dxy * dxy;
    if det.abs() < 1e-12 {
        return (px as f32, py as f32);
    }
    let ox = (dyy * dx - dxy * dy) / det;
    let oy = (dxx * dy - dxy * dx) / det;
    if !ox.is_finite() || !oy.is_finite() {
        return (px as f32, py as f32);
    }
    (px as f32 - ox, py as f32 - oy)
}

/// 可分离高斯平滑 (零填充), 结果按原峰值重新缩放
fn gaussian_blur(hm: ArrayView2<f32>, kernel: usize) -> Array2<f32> {
    let radius = (kernel / 2) as isize;
    // 与 OpenCV 的 sigma=0 约定一致
    let sigma = 0.3 * ((kernel as f32 - 1.) * 0.5 - 1.) + 0.8;
    let mut weights: Vec<f32> = (-radius..=radius)
        .map(|d| (-(d * d) as f32 / (2. * sigma * sigma)).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);

    let (h, w) = hm.dim();
    let convolve = |src: &Array2<f32>, horizontal: bool| {
        Array2::from_shape_fn((h, w), |(y, x)| {
            weights
                .iter()
                .zip(-radius..=radius)
                .map(|(wt, d)| {
                    let (sx, sy) = if horizontal {
                        (x as isize + d, y as isize)
                    } else {
                        (x as isize, y as isize + d)
                    };
                    if sx < 0 || sy < 0 || sx >= w as isize || sy >= h as isize {
                        0.
                    } else {
                        wt * src[[sy as usize, sx as usize]]
                    }
                })
                .sum::<f32>()
        })
    };
    let blurred = convolve(&convolve(&hm.to_owned(), true), false);

    let origin_max = hm.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let blurred_max = blurred.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    if blurred_max > 0. {
        blurred * (origin_max / blurred_max)
    } else {
        blurred
    }
}

impl PoseEstimator for ViTPose {
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

    /// 以 (cx, cy) 为中心、sigma=2 的高斯热力图
    fn gaussian_map(h: usize, w: usize, cx: f32, cy: f32, peak: f32) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(y, x)| {
            let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
            peak * (-d2 / 8.).exp()
        })
    }

    #[test]
    fn test_decode_udp_stride() {
        let mut hm = Array4::<f32>::zeros((1, 2, 64, 48));
        hm.slice_mut(s![0, 0, .., ..]).assign(&gaussian_map(64, 48, 10., 20., 0.9));

        let kpts = decode_heatmaps(&hm, (192, 256)).unwrap();
        assert_eq!(kpts.len(), 2);
        // 对称峰值不偏移, 坐标按 (输入-1)/(热力图-1) 缩放
        assert!((kpts[0].x - 10. * 191. / 47.).abs() < 1e-2);
        assert!((kpts[0].y - 20. * 255. / 63.).abs() < 1e-2);
        assert!((kpts[0].confidence - 0.9).abs() < 1e-6);
        // 全零通道
        assert_eq!(kpts[1].confidence, 0.);
    }

    #[test]
    fn test_decode_sub_pixel_peak() {
        let mut hm = Array4::<f32>::zeros((1, 1, 64, 48));
        hm.slice_mut(s![0, 0, .., ..]).assign(&gaussian_map(64, 48, 20.3, 30.6, 0.8));

        // 输入与热力图同尺寸, 缩放为 1
        let kpts = decode_heatmaps(&hm, (48, 64)).unwrap();
        assert!((kpts[0].x - 20.3).abs() < 0.05, "x = {}", kpts[0].x);
        assert!((kpts[0].y - 30.6).abs() < 0.05, "y = {}", kpts[0].y);
    }

    #[test]
    fn test_decode_confidence_clamped() {
        let mut hm = Array4::<f32>::zeros((1, 1, 8, 6));
        hm[[0, 0, 3, 3]] = 1.7;
        let kpts = decode_heatmaps(&hm, (24, 32)).unwrap();
        assert_eq!(kpts[0].confidence, 1.0);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        let hm = Array4::<f32>::zeros((1, 17, 1, 48));
        assert!(decode_heatmaps(&hm, (192, 256)).is_err());
        let hm = Array4::<f32>::zeros((2, 17, 64, 48));
        assert!(decode_heatmaps(&hm, (192, 256)).is_err());
    }

    #[test]
    fn test_merge_flipped_swaps_pairs() {
        let w = 6;
        let mut hm = Array4::<f32>::zeros((1, 3, 4, w));
        hm[[0, 1, 1, 2]] = 1.0;
        // 翻转输入上, 左侧关键点出现在右侧通道的镜像位置
        let mut flipped = Array4::<f32>::zeros((1, 3, 4, w));
        flipped[[0, 2, 1, w - 1 - 2]] = 0.5;

        let merged = merge_flipped(&hm, flipped, &[(1, 2)]).unwrap();
        assert!((merged[[0, 1, 1, 2]] - 0.75).abs() < 1e-6);
        assert!(merged.slice(s![0, 0, .., ..]).iter().all(|&v| v == 0.));
        assert!(merged.slice(s![0, 2, .., ..]).iter().all(|&v| v == 0.));
    }

    #[test]
    fn test_merge_flipped_rejects_shape_mismatch() {
        let hm = Array4::<f32>::zeros((1, 17, 64, 48));
        let flipped = Array4::<f32>::zeros((1, 17, 48, 64));
        assert!(merge_flipped(&hm, flipped, Topology::Coco17.flip_pairs()).is_err());
    }
}
