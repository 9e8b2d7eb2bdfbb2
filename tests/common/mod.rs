#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use medimg::ExperimentConfig;

/// Writes a small synthetic exam: bright for "lesao", dark otherwise.
pub fn write_exam(path: &Path, lesion: bool, variant: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let base: u32 = if lesion { 200 } else { 40 };
    RgbImage::from_fn(12, 12, |x, y| {
        let v = (base + (x * 3 + y * 5 + variant * 7) % 40) as u8;
        Rgb([v, v, v])
    })
    .save(path)
    .unwrap();
}

/// Creates `root/<split>/{normal,lesao}/` with the given image counts.
pub fn write_split(root: &Path, split: &str, normal: usize, lesao: usize) -> PathBuf {
    let dir = root.join(split);
    for i in 0..normal {
        write_exam(&dir.join("normal").join(format!("n{}.png", i)), false, i as u32);
    }
    for i in 0..lesao {
        write_exam(&dir.join("lesao").join(format!("l{}.png", i)), true, i as u32);
    }
    dir
}

/// Tiny, fast configuration over `root/{train,val}` writing into `root/out`.
pub fn small_config(root: &Path, epochs: usize) -> ExperimentConfig {
    let text = format!(
        r#"{{
            "paths": {{
                "train": {train:?},
                "val": {val:?},
                "output_dir": {out:?}
            }},
            "classes": ["normal", "lesao"],
            "train": {{
                "seed": 7,
                "batch_size": 2,
                "epochs": {epochs},
                "learning_rate": 0.01,
                "patience": 0,
                "prefetch_batches": 1
            }},
            "transforms": {{"image_size": 8, "augment": false}},
            "model": {{"conv_channels": [2]}}
        }}"#,
        train = root.join("train").display().to_string(),
        val = root.join("val").display().to_string(),
        out = root.join("out").display().to_string(),
        epochs = epochs,
    );
    ExperimentConfig::from_json_str(&text).unwrap()
}
