/// 工具模块
/// Utility modules
pub mod affine_transform;

pub use affine_transform::{get_affine_transform, warp_affine_rgb, AffineMatrix};
