// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 骨架拓扑定义 (关键点连接表 + 调色板)

use serde::{Deserialize, Serialize};

/// COCO 17 关键点:
/// 0-鼻子, 1-左眼, 2-右眼, 3-左耳, 4-右耳, 5-左肩, 6-右肩, 7-左肘, 8-右肘,
/// 9-左腕, 10-右腕, 11-左髋, 12-右髋, 13-左膝, 14-右膝, 15-左踝, 16-右踝
pub const COCO_KEYPOINTS: usize = 17;

/// COCO 骨架连接 (19条)
pub const COCO_SKELETON: [(usize, usize); 19] = [
    (15, 13), // 左踝-左膝
    (13, 11), // 左膝-左髋
    (16, 14), // 右踝-右膝
    (14, 12), // 右膝-右髋
    (11, 12), // 左髋-右髋
    (5, 11),  // 左肩-左髋
    (6, 12),  // 右肩-右髋
    (5, 6),   // 左肩-右肩
    (5, 7),   // 左肩-左肘
    (6, 8),   // 右肩-右肘
    (7, 9),   // 左肘-左腕
    (8, 10),  // 右肘-右腕
    (1, 2),   // 左眼-右眼
    (0, 1),   // 鼻子-左眼
    (0, 2),   // 鼻子-右眼
    (1, 3),   // 左眼-左耳
    (2, 4),   // 右眼-右耳
    (3, 5),   // 左耳-左肩
    (4, 6),   // 右耳-右肩
];

/// 左右对称的关键点 (水平翻转时互换)
pub const COCO_FLIP_PAIRS: [(usize, usize); 8] = [
    (1, 2),
    (3, 4),
    (5, 6),
    (7, 8),
    (9, 10),
    (11, 12),
    (13, 14),
    (15, 16),
];

/// 姿态调色板 (RGB)
pub const POSE_PALETTE: [[u8; 3]; 20] = [
    [255, 128, 0],
    [255, 153, 51],
    [255, 178, 102],
    [230, 230, 0],
    [255, 153, 255],
    [153, 204, 255],
    [255, 102, 255],
    [255, 51, 255],
    [102, 178, 255],
    [51, 153, 255],
    [255, 153, 153],
    [255, 102, 102],
    [255, 51, 51],
    [153, 255, 153],
    [102, 255, 102],
    [51, 255, 51],
    [0, 255, 0],
    [0, 0, 255],
    [255, 0, 0],
    [255, 255, 255],
];

/// 连线颜色索引: 腿=橙, 躯干=粉, 手臂=蓝, 头部=绿
const COCO_LIMB_COLORS: [usize; 19] = [0, 0, 0, 0, 7, 7, 7, 9, 9, 9, 9, 9, 16, 16, 16, 16, 16, 16, 16];

/// 关键点颜色索引
const COCO_KPT_COLORS: [usize; 17] = [16, 16, 16, 16, 16, 9, 9, 9, 9, 9, 9, 0, 0, 0, 0, 0, 0];

/// 未知拓扑时关键点使用的颜色 (绿色)
const FALLBACK_COLOR: usize = 16;

/// 骨架拓扑 (由姿态模型决定, 随预测缓存一起传递)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// COCO 17 关键点人体骨架
    Coco17,
    /// 未知关键点布局: 只画点, 不连线
    Unlinked,
}

impl Topology {
    /// 根据关键点数量推断拓扑
    pub fn from_keypoint_count(nk: usize) -> Self {
        if nk == COCO_KEYPOINTS {
            Topology::Coco17
        } else {
            Topology::Unlinked
        }
    }

    pub fn links(&self) -> &'static [(usize, usize)] {
        match self {
            Topology::Coco17 => &COCO_SKELETON,
            Topology::Unlinked => &[],
        }
    }

    /// 未知布局没有对称信息, 返回空
    pub fn flip_pairs(&self) -> &'static [(usize, usize)] {
        match self {
            Topology::Coco17 => &COCO_FLIP_PAIRS,
            Topology::Unlinked => &[],
        }
    }

    pub fn keypoint_color(&self, idx: usize) -> [u8; 3] {
        let palette_idx = match self {
            Topology::Coco17 => COCO_KPT_COLORS.get(idx).copied().unwrap_or(FALLBACK_COLOR),
            Topology::Unlinked => FALLBACK_COLOR,
        };
        POSE_PALETTE[palette_idx]
    }

    pub fn link_color(&self, link_idx: usize) -> [u8; 3] {
        let palette_idx = match self {
            Topology::Coco17 => COCO_LIMB_COLORS
                .get(link_idx)
                .copied()
                .unwrap_or(FALLBACK_COLOR),
            Topology::Unlinked => FALLBACK_COLOR,
        };
        POSE_PALETTE[palette_idx]
    }
}
