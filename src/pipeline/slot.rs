/// 模型槽 (Model Slot)
/// 职责: 持有当前激活的模型, 按名称切换; 切换失败时保留原模型
///
/// 模型在第一次 set_model 时才加载, Redraw 不需要任何模型文件。
use crate::config::RuntimeConfig;
use crate::error::{PipelineError, Result};
use crate::models::{Detector, PoseEstimator, Registry};
use crate::types::{BBox, Frame, PoseResult};
use crate::visualize::Topology;

pub struct ModelSlot<T: ?Sized> {
    registry: Registry<T>,
    active: Option<(String, Box<T>)>,
}

impl<T: ?Sized> ModelSlot<T> {
    pub fn new(registry: Registry<T>) -> Self {
        Self {
            registry,
            active: None,
        }
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn registry(&self) -> &Registry<T> {
        &self.registry
    }

    /// 切换模型: 同名 → 不操作; 未知名称或加载失败 → Config, 当前模型不变
    pub fn set_model(&mut self, name: &str, runtime: &RuntimeConfig) -> Result<()> {
        if let Some(model) = self.prepare(name, runtime)? {
            self.commit(name, model);
        }
        Ok(())
    }

    /// 只加载不切换; 已激活同名模型时返回 None
    pub fn prepare(&self, name: &str, runtime: &RuntimeConfig) -> Result<Option<Box<T>>> {
        if self.active_name() == Some(name) {
            return Ok(None);
        }
        self.registry.load(name, runtime).map(Some)
    }

    pub fn commit(&mut self, name: &str, model: Box<T>) {
        match self.active_name() {
            Some(prev) => log::info!("🔄 模型切换: {} → {}", prev, name),
            None => log::info!("✅ 模型已加载: {}", name),
        }
        self.active = Some((name.to_string(), model));
    }

    fn model(&mut self) -> Result<(&str, &mut T)> {
        self.active
            .as_mut()
            .map(|(name, model)| (name.as_str(), model.as_mut()))
            .ok_or_else(|| PipelineError::Config("尚未加载模型".to_string()))
    }
}

impl ModelSlot<dyn Detector> {
    /// 检测并按阈值过滤 (等于阈值保留)
    pub fn detect(&mut self, frame: &Frame, score_threshold: f32) -> Result<Vec<BBox>> {
        let (_, model) = self.model()?;
        let mut boxes = model.detect(frame)?;
        boxes.retain(|b| b.confidence >= score_threshold);
        Ok(boxes)
    }
}

impl ModelSlot<dyn PoseEstimator> {
    pub fn topology(&self) -> Result<Topology> {
        self.active
            .as_ref()
            .map(|(_, model)| model.topology())
            .ok_or_else(|| PipelineError::Config("尚未加载模型".to_string()))
    }

    /// 每个框恰好一个结果, 否则视为推理错误
    pub fn estimate(&mut self, frame: &Frame, boxes: &[BBox]) -> Result<Vec<PoseResult>> {
        let (name, model) = self.model()?;
        if boxes.is_empty() {
            return Ok(Vec::new());
        }
        let poses = model.estimate(frame, boxes)?;
        if poses.len() != boxes.len() {
            return Err(PipelineError::Inference(format!(
                "{}: {} 个检测框得到 {} 个姿态结果",
                name,
                boxes.len(),
                poses.len()
            )));
        }
        Ok(poses)
    }
}
