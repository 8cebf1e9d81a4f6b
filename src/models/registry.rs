// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 内置模型表: 名称 → 模型文件 / 模型族 / 输入尺寸

use phf::phf_map;

/// 模型族 (决定预处理与输出解码方式)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// YOLOv8 / YOLO11 无锚框检测头, 输出 [1, 4+nc, N]
    YOLOv8,
    /// YOLOX 解耦检测头, 输出 [1, N, 5+nc]
    YOLOX,
    /// ViTPose 热力图头, 输出 [1, K, H/4, W/4]
    ViTPose,
    /// RTMPose SimCC 头, 输出 simcc_x / simcc_y
    RTMPose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: &'static str,
    pub file: &'static str,
    pub family: ModelFamily,
    /// 模型输入 (width, height)
    pub input_size: (u32, u32),
}

pub const DEFAULT_DETECTOR: &str = "yolov8n";
pub const DEFAULT_POSE_MODEL: &str = "vitpose-b";

pub static DETECTORS: [ModelSpec; 6] = [
    ModelSpec {
        name: "yolov8n",
        file: "yolov8n.onnx",
        family: ModelFamily::YOLOv8,
        input_size: (640, 640),
    },
    ModelSpec {
        name: "yolov8s",
        file: "yolov8s.onnx",
        family: ModelFamily::YOLOv8,
        input_size: (640, 640),
    },
    ModelSpec {
        name: "yolov8m",
        file: "yolov8m.onnx",
        family: ModelFamily::YOLOv8,
        input_size: (640, 640),
    },
    ModelSpec {
        name: "yolo11n",
        file: "yolo11n.onnx",
        family: ModelFamily::YOLOv8,
        input_size: (640, 640),
    },
    ModelSpec {
        name: "yolox_s",
        file: "yolox_s.onnx",
        family: ModelFamily::YOLOX,
        input_size: (640, 640),
    },
    ModelSpec {
        name: "yolox_tiny",
        file: "yolox_tiny.onnx",
        family: ModelFamily::YOLOX,
        input_size: (416, 416),
    },
];

static DETECTOR_INDICES: phf::Map<&'static str, usize> = phf_map! {
    "yolov8n" => 0,
    "yolov8s" => 1,
    "yolov8m" => 2,
    "yolo11n" => 3,
    "yolox_s" => 4,
    "yolox_tiny" => 5,
};

pub static POSE_MODELS: [ModelSpec; 3] = [
    ModelSpec {
        name: "vitpose-b",
        file: "vitpose-b.onnx",
        family: ModelFamily::ViTPose,
        input_size: (192, 256),
    },
    ModelSpec {
        name: "vitpose-l",
        file: "vitpose-l.onnx",
        family: ModelFamily::ViTPose,
        input_size: (192, 256),
    },
    ModelSpec {
        name: "rtmpose-m",
        file: "rtmpose-m.onnx",
        family: ModelFamily::RTMPose,
        input_size: (192, 256),
    },
];

static POSE_MODEL_INDICES: phf::Map<&'static str, usize> = phf_map! {
    "vitpose-b" => 0,
    "vitpose-l" => 1,
    "rtmpose-m" => 2,
};

pub fn detector_spec(name: &str) -> Option<&'static ModelSpec> {
    DETECTOR_INDICES.get(name).map(|&i| &DETECTORS[i])
}

pub fn pose_model_spec(name: &str) -> Option<&'static ModelSpec> {
    POSE_MODEL_INDICES.get(name).map(|&i| &POSE_MODELS[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_match_tables() {
        for (i, spec) in DETECTORS.iter().enumerate() {
            assert_eq!(DETECTOR_INDICES.get(spec.name), Some(&i));
        }
        for (i, spec) in POSE_MODELS.iter().enumerate() {
            assert_eq!(POSE_MODEL_INDICES.get(spec.name), Some(&i));
        }
        assert_eq!(DETECTOR_INDICES.len(), DETECTORS.len());
        assert_eq!(POSE_MODEL_INDICES.len(), POSE_MODELS.len());
    }

    #[test]
    fn test_defaults_registered() {
        assert!(detector_spec(DEFAULT_DETECTOR).is_some());
        assert!(pose_model_spec(DEFAULT_POSE_MODEL).is_some());
        assert!(detector_spec("foo").is_none());
        // 检测器与姿态模型是两张独立的表
        assert!(pose_model_spec(DEFAULT_DETECTOR).is_none());
    }
}
