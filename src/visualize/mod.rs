// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 可视化模块 (Visualizer)
///
/// 纯函数, 无内部状态:
/// 帧 + 单帧姿态结果 + 绘制参数 → 标注后的新帧
///
/// 置信度过滤只在这里发生, 这样 Redraw 改阈值时不需要重新推理。
pub mod skeleton;

pub use skeleton::{Topology, COCO_SKELETON, POSE_PALETTE};

use image::Rgb;
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

use crate::error::{PipelineError, Result};
use crate::types::{Frame, PoseResult};

/// 绘制参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderConfig {
    /// 关键点置信度阈值 [0,1], 等于阈值时绘制
    pub kpt_score_threshold: f32,
    /// 关键点圆点半径 [1,10]
    pub dot_radius: u32,
    /// 骨架连线粗细 [1,10]
    pub line_thickness: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            kpt_score_threshold: 0.3,
            dot_radius: 4,
            line_thickness: 2,
        }
    }
}

impl RenderConfig {
    pub fn new(kpt_score_threshold: f32, dot_radius: u32, line_thickness: u32) -> Self {
        Self {
            kpt_score_threshold,
            dot_radius,
            line_thickness,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.kpt_score_threshold) {
            return Err(PipelineError::InvalidParameter(format!(
                "vis_kpt_score_threshold 应在 [0,1] 内, 实际 {}",
                self.kpt_score_threshold
            )));
        }
        if !(1..=10).contains(&self.dot_radius) {
            return Err(PipelineError::InvalidParameter(format!(
                "dot_radius 应在 [1,10] 内, 实际 {}",
                self.dot_radius
            )));
        }
        if !(1..=10).contains(&self.line_thickness) {
            return Err(PipelineError::InvalidParameter(format!(
                "line_thickness 应在 [1,10] 内, 实际 {}",
                self.line_thickness
            )));
        }
        Ok(())
    }
}

/// 绘制图元
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Marker {
        x: f32,
        y: f32,
        radius: u32,
        color: [u8; 3],
    },
    Line {
        from: (f32, f32),
        to: (f32, f32),
        thickness: u32,
        color: [u8; 3],
    },
}

/// 生成单帧的绘制列表 (先画关键点, 再画连线)
pub fn plan(
    poses: &[PoseResult],
    topology: Topology,
    config: &RenderConfig,
    frame_size: (u32, u32),
) -> Vec<Primitive> {
    let (img_w, img_h) = (frame_size.0 as f32, frame_size.1 as f32);
    let thr = config.kpt_score_threshold;
    let mut primitives = Vec::new();

    for pose in poses {
        let visible = |idx: usize| {
            pose.get(idx)
                .filter(|k| k.confidence >= thr && k.x.is_finite() && k.y.is_finite())
        };

        // 关键点
        for idx in 0..pose.len() {
            if let Some(kpt) = visible(idx) {
                primitives.push(Primitive::Marker {
                    x: kpt.x,
                    y: kpt.y,
                    radius: config.dot_radius,
                    color: topology.keypoint_color(idx),
                });
            }
        }

        // 骨架连线: 两端都通过阈值, 且都严格在画面内 (0 < x < w, 0 < y < h)
        for (link_idx, &(a, b)) in topology.links().iter().enumerate() {
            let (Some(ka), Some(kb)) = (visible(a), visible(b)) else {
                continue;
            };
            let inside = |x: f32, y: f32| x > 0. && x < img_w && y > 0. && y < img_h;
            if !inside(ka.x, ka.y) || !inside(kb.x, kb.y) {
                continue;
            }
            primitives.push(Primitive::Line {
                from: (ka.x, ka.y),
                to: (kb.x, kb.y),
                thickness: config.line_thickness,
                color: topology.link_color(link_idx),
            });
        }
    }

    primitives
}

/// 渲染: 返回新的标注帧, 尺寸与输入一致, 未绘制区域像素不变
pub fn render(
    frame: &Frame,
    poses: &[PoseResult],
    topology: Topology,
    config: &RenderConfig,
) -> Frame {
    let mut canvas = frame.clone();
    draw_poses(&mut canvas, poses, topology, config);
    canvas
}

/// 就地绘制
pub fn draw_poses(
    canvas: &mut Frame,
    poses: &[PoseResult],
    topology: Topology,
    config: &RenderConfig,
) {
    for primitive in plan(poses, topology, config, canvas.dimensions()) {
        match primitive {
            Primitive::Marker {
                x,
                y,
                radius,
                color,
            } => {
                draw_filled_circle_mut(
                    canvas,
                    (x.round() as i32, y.round() as i32),
                    radius as i32,
                    Rgb(color),
                );
            }
            Primitive::Line {
                from,
                to,
                thickness,
                color,
            } => draw_thick_line(canvas, from, to, thickness, Rgb(color)),
        }
    }
}

/// 粗线: 矩形多边形 + 两端圆头
fn draw_thick_line(
    canvas: &mut Frame,
    from: (f32, f32),
    to: (f32, f32),
    thickness: u32,
    color: Rgb<u8>,
) {
    if thickness <= 1 {
        draw_line_segment_mut(canvas, from, to, color);
        return;
    }

    let half = thickness as f32 / 2.0;
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len >= 1.0 {
        let (nx, ny) = (-dy / len * half, dx / len * half);
        let pt = |x: f32, y: f32| Point::new(x.round() as i32, y.round() as i32);
        let poly = [
            pt(from.0 + nx, from.1 + ny),
            pt(to.0 + nx, to.1 + ny),
            pt(to.0 - nx, to.1 - ny),
            pt(from.0 - nx, from.1 - ny),
        ];
        // imageproc 要求多边形首尾不重合
        if poly[0] != poly[3] {
            draw_polygon_mut(canvas, &poly, color);
        }
    }

    let cap = (half.round() as i32).max(1);
    draw_filled_circle_mut(canvas, (from.0.round() as i32, from.1.round() as i32), cap, color);
    draw_filled_circle_mut(canvas, (to.0.round() as i32, to.1.round() as i32), cap, color);
}
