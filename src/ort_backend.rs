// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX Runtime 推理后端
//!
//! 检测模型与姿态模型共用: 负责会话创建、执行设备选择、张量输入输出。

use std::path::PathBuf;

use anyhow::{Context, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

/// 执行设备 (Execution Provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
}

pub struct OrtBackend {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        if !args.f.is_file() {
            anyhow::bail!("模型文件不存在: {}", args.f.display());
        }

        let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
        let builder = match args.ep {
            OrtEP::CPU => builder,
            OrtEP::CUDA(device_id) => builder.with_execution_providers([
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])?,
            OrtEP::Trt(device_id) => builder.with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .with_fp16(true)
                    .build(),
                // TensorRT 不支持的算子回退到 CUDA
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])?,
        };
        let session = builder
            .commit_from_file(&args.f)
            .with_context(|| format!("加载 ONNX 模型失败: {}", args.f.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .context("模型没有输入节点")?;
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        if output_names.is_empty() {
            anyhow::bail!("模型没有输出节点");
        }

        log::info!(
            "✅ 模型已加载: {} (EP: {:?}, 输入: {}, 输出: {:?})",
            args.f.display(),
            args.ep,
            input_name,
            output_names
        );

        Ok(Self {
            session,
            input_name,
            output_names,
        })
    }

    /// 单输入推理, 按模型声明顺序返回全部输出
    pub fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        let input = Tensor::from_array(xs)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .context("推理失败")?;

        let mut ys = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let y = outputs[name.as_str()]
                .try_extract_array::<f32>()
                .with_context(|| format!("无法提取输出张量: {}", name))?;
            ys.push(y.into_owned());
        }
        Ok(ys)
    }

    /// 第 idx 个输出声明的维度 (动态维度为 -1)
    pub fn output_dims(&self, idx: usize) -> Option<Vec<i64>> {
        let output = self.session.outputs.get(idx)?;
        output.output_type.tensor_shape().map(|shape| shape.to_vec())
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}
