/// 仿射变换工具模块
/// 实现类似于 cv2::warpAffine 的功能 (姿态模型的检测框裁剪)
use image::{Rgb, RgbImage};

/// 仿射变换矩阵 (2x3)
/// | a11 a12 b1 |
/// | a21 a22 b2 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub a11: f32,
    pub a12: f32,
    pub b1: f32,
    pub a21: f32,
    pub a22: f32,
    pub b2: f32,
}

impl AffineMatrix {
    /// 应用仿射变换到点 (x, y)
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        let new_x = self.a11 * x + self.a12 * y + self.b1;
        let new_y = self.a21 * x + self.a22 * y + self.b2;
        (new_x, new_y)
    }

    /// 计算逆矩阵 (用于反向映射)
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a11 * self.a22 - self.a12 * self.a21;
        if det.abs() < 1e-10 {
            return None; // 矩阵不可逆
        }

        let inv_det = 1.0 / det;
        Some(Self {
            a11: self.a22 * inv_det,
            a12: -self.a12 * inv_det,
            b1: (self.a12 * self.b2 - self.a22 * self.b1) * inv_det,
            a21: -self.a21 * inv_det,
            a22: self.a11 * inv_det,
            b2: (self.a21 * self.b1 - self.a11 * self.b2) * inv_det,
        })
    }
}

/// 仿射变换 (RGB图像, 双线性插值, 边界外填 0)
///
/// # 参数
/// - `src`: 源图像
/// - `matrix`: 源 → 目标 的仿射矩阵
/// - `dst_size`: 目标图像尺寸 (width, height)
///
/// 矩阵不可逆时返回 None
pub fn warp_affine_rgb(
    src: &RgbImage,
    matrix: &AffineMatrix,
    dst_size: (u32, u32),
) -> Option<RgbImage> {
    let (dst_width, dst_height) = dst_size;

    // 使用逆变换进行反向映射
    let inv_matrix = matrix.inverse()?;

    let mut dst = RgbImage::new(dst_width, dst_height);
    for (dst_x, dst_y, pixel) in dst.enumerate_pixels_mut() {
        let (src_x, src_y) = inv_matrix.transform_point(dst_x as f32, dst_y as f32);
        *pixel = sample_bilinear(src, src_x, src_y);
    }

    Some(dst)
}

/// 双线性插值 (RGB)
fn sample_bilinear(src: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = border_pixel(src, x0, y0);
    let p01 = border_pixel(src, x0, y0 + 1);
    let p10 = border_pixel(src, x0 + 1, y0);
    let p11 = border_pixel(src, x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let v0 = p00[c] * (1.0 - fx) + p10[c] * fx;
        let v1 = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (v0 * (1.0 - fy) + v1 * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// 边界处理: 常数 0 填充
fn border_pixel(src: &RgbImage, x: i64, y: i64) -> [f32; 3] {
    if x >= 0 && y >= 0 && x < src.width() as i64 && y < src.height() as i64 {
        let p = src.get_pixel(x as u32, y as u32).0;
        [p[0] as f32, p[1] as f32, p[2] as f32]
    } else {
        [0.0; 3]
    }
}

/// 从3个对应点对获取仿射变换矩阵
///
/// # 参数
/// - `src_pts`: 源图像中的3个点 [(x1,y1), (x2,y2), (x3,y3)]
/// - `dst_pts`: 目标图像中的3个点 [(x1,y1), (x2,y2), (x3,y3)]
pub fn get_affine_transform(
    src_pts: [(f32, f32); 3],
    dst_pts: [(f32, f32); 3],
) -> Option<AffineMatrix> {
    // [x1 y1 1  0  0  0] [a11]   [x1']
    // [0  0  0  x1 y1 1] [a12]   [y1']
    // [x2 y2 1  0  0  0] [b1 ] = [x2']
    // [0  0  0  x2 y2 1] [a21]   [y2']
    // [x3 y3 1  0  0  0] [a22]   [x3']
    // [0  0  0  x3 y3 1] [b2 ]   [y3']
    let mut matrix = [[0.0f32; 7]; 6];
    for (i, (s, d)) in src_pts.iter().zip(dst_pts.iter()).enumerate() {
        matrix[2 * i] = [s.0, s.1, 1.0, 0.0, 0.0, 0.0, d.0];
        matrix[2 * i + 1] = [0.0, 0.0, 0.0, s.0, s.1, 1.0, d.1];
    }

    // 高斯消元 (列主元)
    for i in 0..6 {
        let max_row = (i..6)
            .max_by(|&a, &b| matrix[a][i].abs().total_cmp(&matrix[b][i].abs()))
            .unwrap_or(i);
        matrix.swap(i, max_row);

        // 三点共线时矩阵奇异
        if matrix[i][i].abs() < 1e-10 {
            return None;
        }

        for j in (i + 1)..6 {
            let factor = matrix[j][i] / matrix[i][i];
            for k in i..=6 {
                matrix[j][k] -= factor * matrix[i][k];
            }
        }
    }

    // 回代求解
    let mut x = [0.0f32; 6];
    for i in (0..6).rev() {
        x[i] = matrix[i][6];
        for j in (i + 1)..6 {
            x[i] -= matrix[i][j] * x[j];
        }
        x[i] /= matrix[i][i];
    }

    Some(AffineMatrix {
        a11: x[0],
        a12: x[1],
        b1: x[2],
        a21: x[3],
        a22: x[4],
        b2: x[5],
    })
}
