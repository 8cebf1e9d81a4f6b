// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 错误处理模块
//!
//! 流水线中所有错误对当前 Predict/Redraw 都是致命的: 中止本次运行,
//! 释放解码器/编码器, 把错误交还给调用方, 不做自动重试。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// 视频不存在 / 容器或编码无法解析
    #[error("视频解码错误: {0}")]
    Decode(String),

    /// 未知模型名称 / 模型文件缺失
    #[error("配置错误: {0}")]
    Config(String),

    /// 模型前向推理失败 (例如输入形状异常)
    #[error("推理错误: {0}")]
    Inference(String),

    /// 输出文件不可写 / 编码器不可用
    #[error("视频编码错误: {0}")]
    Encode(String),

    /// Redraw 重新解码得到的帧数与缓存长度不一致
    #[error("帧数不匹配: 缓存 {expected} 帧, 视频解码得到 {actual} 帧")]
    Mismatch { expected: usize, actual: usize },

    #[error("无效参数: {0}")]
    InvalidParameter(String),

    #[error("流水线正在运行, 拒绝并发调用")]
    Busy,

    #[error("任务已取消")]
    Cancelled,

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
