use std::path::Path;

use image::Rgb;
use pose_video_rs::input::{FfmpegFrameSource, FrameSource};
use pose_video_rs::output::{write_video, FfmpegSinkFactory};
use pose_video_rs::{Frame, FrameRate, PipelineError};

const FRAMES: usize = 12;

fn synthetic_video(n: usize) -> Vec<Frame> {
    (0..n)
        .map(|i| {
            Frame::from_fn(64, 48, |x, y| {
                Rgb([(x * 4) as u8, (y * 5) as u8, (i * 20) as u8])
            })
        })
        .collect()
}

fn same_rate(a: FrameRate, b: FrameRate) -> bool {
    a.num as i64 * b.den as i64 == b.num as i64 * a.den as i64
}

fn decode_all(path: &Path, max_frames: usize) -> (FrameRate, Vec<Frame>) {
    let (rate, frames) = FfmpegFrameSource::new().open(path, max_frames).unwrap();
    (rate, frames.collect::<Result<Vec<_>, _>>().unwrap())
}

#[test]
fn encoded_video_keeps_rate_and_frame_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ntsc.mp4");
    let rate = FrameRate::new(30000, 1001);

    let written = write_video(&FfmpegSinkFactory::new(), &synthetic_video(FRAMES), rate, &path).unwrap();
    assert_eq!(written, FRAMES);
    assert!(path.is_file());
    // 暂存文件已改名
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    let (decoded_rate, all) = decode_all(&path, FRAMES);
    assert!(same_rate(decoded_rate, rate), "帧率 {}", decoded_rate);
    assert_eq!(all.len(), FRAMES);
    assert_eq!(all[0].dimensions(), (64, 48));

    // 每次打开都从头开始
    let (_, capped) = decode_all(&path, FRAMES - 2);
    assert_eq!(capped.len(), FRAMES - 2);
    assert_eq!(capped[0], all[0]);

    // 上限大于实际帧数: 提前结束, 不报错
    let (_, more) = decode_all(&path, FRAMES + 10);
    assert_eq!(more.len(), FRAMES);
}

#[test]
fn odd_sized_frames_are_encoded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("odd.mp4");
    let frames: Vec<Frame> = (0..3).map(|_| Frame::new(33, 17)).collect();

    let written = write_video(&FfmpegSinkFactory::new(), &frames, FrameRate::new(25, 1), &path).unwrap();
    assert_eq!(written, 3);

    let (rate, decoded) = decode_all(&path, 10);
    assert!(same_rate(rate, FrameRate::new(25, 1)));
    assert_eq!(decoded.len(), 3);
}

#[test]
fn garbage_container_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.mp4");
    std::fs::write(&path, b"this is not an mp4 container at all").unwrap();

    assert!(matches!(
        FfmpegFrameSource::new().open(&path, 5),
        Err(PipelineError::Decode(_))
    ));
}

#[test]
fn mismatched_frame_size_is_encode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.mp4");
    let frames = vec![Frame::new(64, 48), Frame::new(32, 24)];

    assert!(matches!(
        write_video(&FfmpegSinkFactory::new(), &frames, FrameRate::new(25, 1), &path),
        Err(PipelineError::Encode(_))
    ));
    // 失败时不留下任何文件
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
