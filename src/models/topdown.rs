// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Top-down 姿态模型的公共部分
//!
//! 检测框 → (中心, 尺度) → 仿射裁剪到模型输入 → 推理 → 关键点逆变换回原图

use anyhow::{Context, Result};
use ndarray::{Array, IxDyn};

use crate::types::{BBox, Frame, Keypoint};
use crate::utils::{get_affine_transform, warp_affine_rgb, AffineMatrix};
use crate::visualize::Topology;

/// 检测框外扩比例
pub const BOX_PADDING: f32 = 1.25;

/// ImageNet 均值/方差 (0-255 尺度, RGB)
pub const MEAN: [f32; 3] = [123.675, 116.28, 103.53];
pub const STD: [f32; 3] = [58.395, 57.12, 57.375];

/// 按输出维度 [1, K, ...] 的 K 确定骨架; K 为动态维度时按 COCO-17 处理
pub fn output_topology(dims: Option<&[i64]>) -> Topology {
    match dims.and_then(|d| d.get(1)) {
        Some(&k) if k > 0 => Topology::from_keypoint_count(k as usize),
        _ => Topology::Coco17,
    }
}

/// 检测框 → 中心 + 尺度 (宽高比与模型输入一致, 并外扩)
pub fn box_to_center_scale(bbox: &BBox, input_size: (u32, u32)) -> ((f32, f32), (f32, f32)) {
    let aspect = input_size.0 as f32 / input_size.1 as f32;
    let mut w = bbox.width().max(1.0);
    let mut h = bbox.height().max(1.0);
    if w > aspect * h {
        h = w / aspect;
    } else {
        w = h * aspect;
    }
    (bbox.center(), (w * BOX_PADDING, h * BOX_PADDING))
}

/// 裁剪框映射到的输入坐标范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    /// [0, W] x [0, H]
    Standard,
    /// UDP: [0, W-1] x [0, H-1], 像素中心对齐
    Unbiased,
}

/// 原图 → 模型输入 的仿射矩阵
pub fn crop_transform(
    center: (f32, f32),
    scale: (f32, f32),
    input_size: (u32, u32),
    mode: CropMode,
) -> Option<AffineMatrix> {
    let (cx, cy) = center;
    let (sw, sh) = scale;
    let (dw, dh) = match mode {
        CropMode::Standard => (input_size.0 as f32, input_size.1 as f32),
        CropMode::Unbiased => (input_size.0 as f32 - 1., input_size.1 as f32 - 1.),
    };
    get_affine_transform(
        [(cx, cy), (cx, cy - sh / 2.), (cx - sw / 2., cy - sh / 2.)],
        [(dw / 2., dh / 2.), (dw / 2., 0.), (0., 0.)],
    )
}

/// 裁剪后的单个实例
pub struct Crop {
    /// NCHW, ImageNet 归一化
    pub tensor: Array<f32, IxDyn>,
    /// 模型输入坐标 → 原图坐标
    pub to_frame: AffineMatrix,
}

pub fn crop(frame: &Frame, bbox: &BBox, input_size: (u32, u32), mode: CropMode) -> Result<Crop> {
    let (center, scale) = box_to_center_scale(bbox, input_size);
    let matrix =
        crop_transform(center, scale, input_size, mode).context("检测框无法构造仿射变换")?;
    let patch = warp_affine_rgb(frame, &matrix, input_size).context("仿射矩阵不可逆")?;
    let to_frame = matrix.inverse().context("仿射矩阵不可逆")?;

    Ok(Crop {
        tensor: normalize(&patch),
        to_frame,
    })
}

/// RGB → NCHW, (x - mean) / std
pub fn normalize(img: &Frame) -> Array<f32, IxDyn> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut ys = Array::zeros((1, 3, h, w)).into_dyn();
    for (x, y, rgb) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            ys[[0, c, y, x]] = (rgb.0[c] as f32 - MEAN[c]) / STD[c];
        }
    }
    ys
}

/// 模型输入坐标的关键点 → 原图坐标
pub fn map_back(keypoints: &[Keypoint], to_frame: &AffineMatrix) -> Vec<Keypoint> {
    keypoints
        .iter()
        .map(|k| {
            let (x, y) = to_frame.transform_point(k.x, k.y);
            Keypoint::new(x, y, k.confidence)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_output_topology_from_keypoint_dim() {
        assert_eq!(output_topology(Some(&[1, 17, 64, 48])), Topology::Coco17);
        assert_eq!(output_topology(Some(&[1, 133, 384])), Topology::Unlinked);
        // 动态维度
        assert_eq!(output_topology(Some(&[1, -1, 64, 48])), Topology::Coco17);
        assert_eq!(output_topology(None), Topology::Coco17);
    }

    #[test]
    fn test_center_scale_fixes_aspect() {
        // 输入 192x256 (宽高比 0.75)
        let tall = BBox::new(0., 0., 30., 80., 0.9);
        let (c, s) = box_to_center_scale(&tall, (192, 256));
        assert_eq!(c, (15., 40.));
        assert!((s.0 - 60. * BOX_PADDING).abs() < 1e-4);
        assert!((s.1 - 80. * BOX_PADDING).abs() < 1e-4);

        let wide = BBox::new(0., 0., 90., 40., 0.9);
        let (_, s) = box_to_center_scale(&wide, (192, 256));
        assert!((s.0 - 90. * BOX_PADDING).abs() < 1e-4);
        assert!((s.1 - 120. * BOX_PADDING).abs() < 1e-4);
    }

    #[test]
    fn test_crop_center_maps_back_to_box_center() {
        let frame = Frame::from_pixel(200, 200, Rgb([120, 120, 120]));
        let bbox = BBox::new(50., 40., 110., 160., 0.9);
        let crop = crop(&frame, &bbox, (192, 256), CropMode::Standard).unwrap();
        assert_eq!(crop.tensor.shape(), &[1, 3, 256, 192]);

        let kpts = map_back(&[Keypoint::new(96., 128., 0.7)], &crop.to_frame);
        assert!((kpts[0].x - 80.).abs() < 1e-3);
        assert!((kpts[0].y - 100.).abs() < 1e-3);
        assert_eq!(kpts[0].confidence, 0.7);
    }

    #[test]
    fn test_unbiased_crop_maps_pixel_centers() {
        let frame = Frame::new(200, 200);
        let bbox = BBox::new(50., 40., 110., 160., 0.9);
        let crop = crop(&frame, &bbox, (192, 256), CropMode::Unbiased).unwrap();
        let (_, scale) = box_to_center_scale(&bbox, (192, 256));

        // 输入中心 ((W-1)/2, (H-1)/2) 对应框中心, 首末像素对应裁剪框两边
        let kpts = map_back(
            &[
                Keypoint::new(95.5, 127.5, 1.),
                Keypoint::new(0., 0., 1.),
                Keypoint::new(191., 255., 1.),
            ],
            &crop.to_frame,
        );
        assert!((kpts[0].x - 80.).abs() < 1e-3 && (kpts[0].y - 100.).abs() < 1e-3);
        assert!((kpts[1].x - (80. - scale.0 / 2.)).abs() < 1e-2);
        assert!((kpts[2].x - (80. + scale.0 / 2.)).abs() < 1e-2);
        assert!((kpts[2].y - (100. + scale.1 / 2.)).abs() < 1e-2);
    }

    #[test]
    fn test_crop_degenerate_box() {
        let frame = Frame::new(64, 64);
        let bbox = BBox::new(10., 10., 10., 10., 0.9);
        assert!(crop(&frame, &bbox, (192, 256), CropMode::Standard).is_ok());
    }

    #[test]
    fn test_normalize_values() {
        let img = Frame::from_pixel(2, 2, Rgb([MEAN[0] as u8, 255, 0]));
        let t = normalize(&img);
        assert!((t[[0, 0, 1, 1]] - (123. - MEAN[0]) / STD[0]).abs() < 1e-5);
        assert!((t[[0, 1, 0, 0]] - (255. - MEAN[1]) / STD[1]).abs() < 1e-5);
        assert!((t[[0, 2, 0, 1]] - (0. - MEAN[2]) / STD[2]).abs() < 1e-5);
    }
}
