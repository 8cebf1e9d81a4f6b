/// 视频人体姿态估计 (Pose Video)
///
/// predict: 检测 + 关键点 + 骨架绘制, 输出标注视频 (可保存预测缓存)
/// redraw:  读取预测缓存, 只改绘制参数重新输出, 不做推理
/// models:  列出内置模型
use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;

use pose_video_rs::config::Command;
use pose_video_rs::models::registry::{detector_spec, pose_model_spec, ModelSpec};
use pose_video_rs::models::{builtin_detectors, builtin_pose_models};
use pose_video_rs::{Args, Pipeline, PredictParams, PredictionCache, RenderConfig, RuntimeConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn print_model(spec: Option<&ModelSpec>, runtime: &RuntimeConfig) {
    let Some(spec) = spec else {
        return;
    };
    let path = runtime.model_path(spec.file);
    println!(
        "  {:<12} {:?} {}x{}  {} {}",
        spec.name,
        spec.family,
        spec.input_size.0,
        spec.input_size.1,
        path.display(),
        if path.is_file() { "✅" } else { "❌ 缺失" }
    );
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let runtime = RuntimeConfig::init(RuntimeConfig {
        device: args.device,
        model_dir: args.model_dir.clone(),
    })?;
    log::info!(
        "⚙️ 设备: {:?}, 模型目录: {}",
        runtime.device,
        runtime.model_dir.display()
    );

    match args.command {
        Command::Predict {
            video,
            detector,
            pose_model,
            det_score_threshold,
            max_frames,
            render,
            save_cache,
        } => {
            let params = PredictParams {
                detector_name: detector,
                pose_model_name: pose_model,
                det_score_threshold,
                max_frames,
                render: RenderConfig::from(render),
            };
            let mut pipeline = Pipeline::with_defaults(runtime.clone(), &args.output_dir);
            let (out_path, cache) = pipeline.predict(&video, &params)?;
            println!("{}", out_path.display());

            if let Some(path) = save_cache {
                cache
                    .save(&path)
                    .with_context(|| format!("保存预测缓存失败: {}", path.display()))?;
                log::info!("💾 预测缓存: {} ({} 帧)", path.display(), cache.len());
            }
        }
        Command::Redraw {
            video,
            cache,
            render,
        } => {
            let cache = PredictionCache::load(&cache)
                .with_context(|| format!("读取预测缓存失败: {}", cache.display()))?;
            let mut pipeline = Pipeline::with_defaults(runtime.clone(), &args.output_dir);
            let out_path = pipeline.redraw(&video, &cache, &RenderConfig::from(render))?;
            println!("{}", out_path.display());
        }
        Command::Models => {
            let detectors = builtin_detectors();
            println!("检测模型 (默认 {}):", detectors.default_name());
            for name in detectors.names() {
                print_model(detector_spec(name), runtime);
            }
            let pose_models = builtin_pose_models();
            println!("姿态模型 (默认 {}):", pose_models.default_name());
            for name in pose_models.names() {
                print_model(pose_model_spec(name), runtime);
            }
        }
    }
    Ok(())
}
