//! Tests the layer with its default collaborators on JPEG frames written to a
//! temporary directory.

mod common;
use common::list_file;

use video_data::{Phase, VideoDataConfig, VideoDataLayer};

use anyhow::Result;
use image::{GrayImage, Luma, Rgb, RgbImage};
use std::io::Write;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};

const WIDTH: u32 = 16;
const HEIGHT: u32 = 12;

/// Frame `i` (1-based) is a flat image with red = 10 * i.
fn write_rgb_frames(dir: &Path, count: usize) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for index in 1..=count {
        RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([10 * index as u8, 50, 200]))
            .save(dir.join(format!("img_{:05}.jpg", index)))?;
    }
    Ok(())
}

/// Flow x of frame `i` is 20 * i; flow y is its complement.
fn write_flow_frames(dir: &Path, count: usize) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for index in 1..=count {
        let value = 20 * index as u8;
        GrayImage::from_pixel(WIDTH, HEIGHT, Luma([value]))
            .save(dir.join(format!("flow_x_{:05}.jpg", index)))?;
        GrayImage::from_pixel(WIDTH, HEIGHT, Luma([255 - value]))
            .save(dir.join(format!("flow_y_{:05}.jpg", index)))?;
    }
    Ok(())
}

fn assert_close(actual: f32, expected: f32) {
    // Flat JPEG frames survive compression up to rounding.
    assert!(
        (actual - expected).abs() <= 3.0,
        "expected about {}, got {}",
        expected,
        actual
    );
}

#[test]
fn test_rgb_segments_with_center_crop() -> Result<()> {
    let root = TempDir::new()?;
    write_rgb_frames(&root.path().join("clip_a"), 12)?;
    write_rgb_frames(&root.path().join("clip_b"), 12)?;
    let list = list_file(&["clip_a 12 3", "clip_b 12 4"])?;

    let config = VideoDataConfig::builder()
        .source(list.path())
        .root_folders([root.path()])
        .new_lengths([2])
        .num_segments(2)
        .new_size(HEIGHT, WIDTH)
        .batch_size(2)
        .crop_size(8)
        .mean_values([128.0])
        .phase(Phase::Test)
        .build();

    let collaborators = VideoDataLayer::default_collaborators(&config)?;
    let mut layer = VideoDataLayer::setup(&config, collaborators, 2)?;
    // 2 segments x 2 frames x 3 channels, cropped to 8x8.
    assert_eq!(layer.output_shapes().data, [2, 12, 8, 8]);

    let batch = layer.forward()?;
    assert_eq!(batch.labels(), &[3, 4]);

    // Segments of 6 frames start at offsets 2 and 8: frames 3, 4, 9 and 10.
    let plane = 8 * 8;
    let item = batch.item(0);
    for (frame_slot, frame) in [3.0, 4.0, 9.0, 10.0].into_iter().enumerate() {
        let red = &item[frame_slot * 3 * plane..][..plane];
        assert!(red.iter().all(|&v| (v - (10.0 * frame - 128.0)).abs() <= 3.0));
        assert_close(item[(frame_slot * 3 + 2) * plane], 200.0 - 128.0);
    }
    Ok(())
}

#[test]
fn test_two_stream_config_from_json() -> Result<()> {
    let rgb_root = TempDir::new()?;
    let flow_root = TempDir::new()?;
    write_rgb_frames(&rgb_root.path().join("good"), 6)?;
    write_flow_frames(&flow_root.path().join("good"), 6)?;
    // "missing" has no frames at all and is skipped.
    let list = list_file(&["good 6 1", "missing 6 2"])?;

    let mut json = NamedTempFile::new()?;
    write!(
        json,
        r#"{{
            "source": {source:?},
            "modality": "BOTH",
            "root_folders": [{rgb:?}, {flow:?}],
            "new_lengths": [1],
            "interval": 1,
            "batch_size": 2,
            "phase": "TEST",
            "seed": 5
        }}"#,
        source = list.path(),
        rgb = rgb_root.path(),
        flow = flow_root.path(),
    )?;
    let config = VideoDataConfig::from_json_file(json.path())?;

    let collaborators = VideoDataLayer::default_collaborators(&config)?;
    let mut layer = VideoDataLayer::setup(&config, collaborators, 2)?;
    // Three RGB planes then flow x and flow y.
    assert_eq!(layer.output_shapes().data, [2, 5, 12, 16]);

    let batch = layer.forward()?;
    assert_eq!(batch.labels(), &[1, 1]);

    // Usable duration 5, clip of 1: the center offset is 2, i.e. frame 3.
    let plane = (HEIGHT * WIDTH) as usize;
    let item = batch.item(1);
    assert_close(item[0], 30.0);
    assert_close(item[3 * plane], 60.0);
    assert_close(item[4 * plane], 195.0);
    assert!(layer.fetcher()?.skipped() >= 1);
    Ok(())
}

#[test]
fn test_unreadable_first_video_fails_setup() -> Result<()> {
    let root = TempDir::new()?;
    let list = list_file(&["nowhere 10 0"])?;
    let config = VideoDataConfig::builder()
        .source(list.path())
        .root_folders([root.path()])
        .build();

    let collaborators = VideoDataLayer::default_collaborators(&config)?;
    let err = VideoDataLayer::setup(&config, collaborators, 2).err().unwrap();
    assert!(format!("{:#}", err).contains("nowhere"));
    Ok(())
}
